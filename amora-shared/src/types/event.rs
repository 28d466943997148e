use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Telemetry envelope published to the `amora.events` topic exchange.
///
/// Routing key format: `amora.{domain}.{event}`, e.g. `amora.antiabuse.shadow_enabled`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event<T: Serialize> {
    pub id: Uuid,
    pub source: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<i64>,
    pub data: T,
}

impl<T: Serialize> Event<T> {
    pub fn new(source: impl Into<String>, event_type: impl Into<String>, data: T) -> Self {
        Self {
            id: Uuid::now_v7(),
            source: source.into(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            user_id: None,
            data,
        }
    }

    pub fn with_user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Event names as they appear in `event_type`.
pub mod event_names {
    pub const ANTIABUSE_SHADOW_ENABLED: &str = "antiabuse_shadow_enabled";
    pub const ANTIABUSE_LOW_CARD_VIEW: &str = "antiabuse_low_card_view";
    pub const ANTIABUSE_TOO_FAST: &str = "antiabuse_too_fast";
    pub const ANTIABUSE_COOLDOWN_ACTIVE: &str = "antiabuse_cooldown_active";
    pub const MATCH_CREATED: &str = "match_created";
    pub const MODERATION_DECIDED: &str = "moderation_decided";
    pub const PAYMENT_SUCCEEDED: &str = "payment_succeeded";
    pub const CLIENT_EVENT: &str = "client_event";
}

pub mod routing_keys {
    pub const ANTIABUSE_SHADOW_ENABLED: &str = "amora.antiabuse.shadow_enabled";
    pub const ANTIABUSE_LOW_CARD_VIEW: &str = "amora.antiabuse.low_card_view";
    pub const ANTIABUSE_TOO_FAST: &str = "amora.antiabuse.too_fast";
    pub const ANTIABUSE_COOLDOWN_ACTIVE: &str = "amora.antiabuse.cooldown_active";
    pub const SWIPE_MATCH_CREATED: &str = "amora.swipe.match_created";
    pub const MODERATION_DECIDED: &str = "amora.moderation.decided";
    pub const PAYMENT_SUCCEEDED: &str = "amora.payment.succeeded";
    pub const CLIENT_EVENT: &str = "amora.client.event";
}

pub mod payloads {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ShadowEnabled {
        pub user_id: i64,
        pub risk: i64,
        pub threshold: i64,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct LowCardView {
        pub user_id: i64,
        pub target_id: i64,
        pub action: String,
        pub card_view_ms: i64,
        pub min_card_view_ms: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub swipe_velocity: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub screen: Option<String>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Throttled {
        pub user_id: i64,
        pub retry_after_sec: i64,
        pub cooldown_until: Option<DateTime<Utc>>,
        pub risk: Option<i64>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct MatchCreated {
        pub user_a_id: i64,
        pub user_b_id: i64,
        pub via_super_like: bool,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ModerationDecided {
        pub item_id: i64,
        pub user_id: i64,
        pub status: String,
        pub actor_id: i64,
        pub reason_code: Option<String>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct PaymentSucceeded {
        pub transaction_id: i64,
        pub user_id: i64,
        pub provider: String,
        pub product_sku: String,
        pub amount: i64,
        pub currency: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ClientEvent {
        pub name: String,
        pub client_ts: Option<DateTime<Utc>>,
        pub props: serde_json::Value,
    }
}
