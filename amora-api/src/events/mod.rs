use async_trait::async_trait;
use serde_json::Value;

use amora_shared::clients::rabbitmq::RabbitMQClient;
use amora_shared::types::Event;

pub mod publisher;

pub const SERVICE_NAME: &str = "amora-api";

/// Where server telemetry goes. Publishing never fails the caller.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, routing_key: &str, event: Event<Value>);
}

/// Forwards events to the broker when one is configured, otherwise logs them.
pub struct Telemetry {
    rabbitmq: Option<RabbitMQClient>,
}

impl Telemetry {
    pub fn new(rabbitmq: Option<RabbitMQClient>) -> Self {
        Self { rabbitmq }
    }

    pub fn log_only() -> Self {
        Self { rabbitmq: None }
    }
}

#[async_trait]
impl EventSink for Telemetry {
    async fn publish(&self, routing_key: &str, event: Event<Value>) {
        match &self.rabbitmq {
            Some(rabbitmq) => {
                if let Err(e) = rabbitmq.publish(routing_key, &event).await {
                    tracing::warn!(error = %e, routing_key = %routing_key, "failed to publish event");
                }
            }
            None => {
                tracing::info!(
                    routing_key = %routing_key,
                    event_type = %event.event_type,
                    user_id = ?event.user_id,
                    "telemetry event"
                );
            }
        }
    }
}
