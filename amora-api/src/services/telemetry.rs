use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use amora_shared::errors::{AppError, AppResult};
use amora_shared::types::event::payloads;

use crate::events::{publisher, EventSink};

pub const MAX_BATCH: usize = 100;
const MAX_NAME_LEN: usize = 64;

#[derive(Debug, Clone, Deserialize)]
pub struct ClientEventIn {
    pub name: String,
    #[serde(default)]
    pub ts: Option<DateTime<Utc>>,
    #[serde(default)]
    pub props: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventBatch {
    pub events: Vec<ClientEventIn>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchAccepted {
    pub accepted: usize,
}

/// Forwards a client batch. Events with blank or oversized names are dropped.
pub async fn ingest(
    sink: &dyn EventSink,
    user_id: Option<i64>,
    batch: EventBatch,
    now: DateTime<Utc>,
) -> AppResult<BatchAccepted> {
    if batch.events.len() > MAX_BATCH {
        return Err(AppError::validation(format!("at most {MAX_BATCH} events per batch")));
    }

    let mut accepted = 0;
    for event in batch.events {
        let name = event.name.trim();
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            continue;
        }
        let payload = payloads::ClientEvent {
            name: name.to_string(),
            client_ts: event.ts,
            props: event.props.unwrap_or(serde_json::Value::Null),
        };
        publisher::publish_client_event(sink, user_id, payload, now).await;
        accepted += 1;
    }

    tracing::debug!(user_id = ?user_id, accepted, "client events accepted");
    Ok(BatchAccepted { accepted })
}
