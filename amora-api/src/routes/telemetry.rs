use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::Utc;

use amora_shared::errors::AppResult;
use amora_shared::middleware::OptionalAuthUser;

use crate::services::telemetry::{self, BatchAccepted, EventBatch};
use crate::AppState;

pub async fn batch(
    State(state): State<Arc<AppState>>,
    OptionalAuthUser(user): OptionalAuthUser,
    Json(batch): Json<EventBatch>,
) -> AppResult<Json<BatchAccepted>> {
    let accepted = telemetry::ingest(state.events.as_ref(), user.map(|u| u.id), batch, Utc::now()).await?;
    Ok(Json(accepted))
}
