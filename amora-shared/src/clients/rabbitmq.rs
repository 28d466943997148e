use lapin::options::{BasicPublishOptions, ExchangeDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use serde::Serialize;

use crate::types::Event;

const EXCHANGE_NAME: &str = "amora.events";

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("event encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("broker error: {0}")]
    Broker(#[from] lapin::Error),
}

/// Publisher on a durable topic exchange. Events are fire-and-forget
/// telemetry; there are no consumers in this process.
#[derive(Clone)]
pub struct RabbitMQClient {
    channel: Channel,
}

impl RabbitMQClient {
    pub async fn connect(url: &str) -> Result<Self, lapin::Error> {
        let conn = Connection::connect(url, ConnectionProperties::default()).await?;
        let channel = conn.create_channel().await?;

        let options = ExchangeDeclareOptions { durable: true, ..Default::default() };
        channel
            .exchange_declare(EXCHANGE_NAME, ExchangeKind::Topic, options, FieldTable::default())
            .await?;

        tracing::info!(exchange = EXCHANGE_NAME, "connected to RabbitMQ");
        Ok(Self { channel })
    }

    pub async fn publish<T: Serialize>(&self, routing_key: &str, event: &Event<T>) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(event)?;

        self.channel
            .basic_publish(
                EXCHANGE_NAME,
                routing_key,
                BasicPublishOptions::default(),
                &payload,
                properties(event),
            )
            .await?
            .await?;

        tracing::debug!(routing_key = %routing_key, event_id = %event.id, "event published");
        Ok(())
    }
}

/// Persistent JSON message stamped with the event id, type and time.
fn properties<T: Serialize>(event: &Event<T>) -> BasicProperties {
    BasicProperties::default()
        .with_content_type("application/json".into())
        .with_delivery_mode(2)
        .with_message_id(event.id.to_string().into())
        .with_kind(event.event_type.clone().into())
        .with_app_id(event.source.clone().into())
        .with_timestamp(event.timestamp.timestamp().max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_event_identity() {
        let event = Event::new("amora-api", "match_created", serde_json::json!({"match_id": 1}));
        let props = properties(&event);

        assert_eq!(props.delivery_mode(), &Some(2));
        assert_eq!(
            props.message_id().as_ref().map(|s| s.as_str().to_string()),
            Some(event.id.to_string())
        );
        assert_eq!(props.kind().as_ref().map(|s| s.as_str()), Some("match_created"));
        assert_eq!(props.app_id().as_ref().map(|s| s.as_str()), Some("amora-api"));
    }
}
