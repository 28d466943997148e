use chrono::{DateTime, Utc};
use serde::Serialize;

use amora_shared::types::event::{event_names, payloads, routing_keys, Event};

use super::{EventSink, SERVICE_NAME};

async fn emit<T: Serialize>(sink: &dyn EventSink, routing_key: &str, event: Event<T>) {
    let data = match serde_json::to_value(&event.data) {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!(error = %e, routing_key = %routing_key, "failed to serialize event payload");
            return;
        }
    };
    let event = Event {
        id: event.id,
        source: event.source,
        event_type: event.event_type,
        timestamp: event.timestamp,
        user_id: event.user_id,
        data,
    };
    sink.publish(routing_key, event).await;
}

pub async fn publish_shadow_enabled(sink: &dyn EventSink, user_id: i64, risk: i64, threshold: i64) {
    let event = Event::new(
        SERVICE_NAME,
        event_names::ANTIABUSE_SHADOW_ENABLED,
        payloads::ShadowEnabled { user_id, risk, threshold },
    )
    .with_user(user_id);

    emit(sink, routing_keys::ANTIABUSE_SHADOW_ENABLED, event).await;
}

pub async fn publish_low_card_view(sink: &dyn EventSink, payload: payloads::LowCardView) {
    let user_id = payload.user_id;
    let event = Event::new(SERVICE_NAME, event_names::ANTIABUSE_LOW_CARD_VIEW, payload).with_user(user_id);

    emit(sink, routing_keys::ANTIABUSE_LOW_CARD_VIEW, event).await;
}

pub async fn publish_too_fast(
    sink: &dyn EventSink,
    user_id: i64,
    retry_after_sec: i64,
    cooldown_until: Option<DateTime<Utc>>,
    risk: Option<i64>,
) {
    let event = Event::new(
        SERVICE_NAME,
        event_names::ANTIABUSE_TOO_FAST,
        payloads::Throttled { user_id, retry_after_sec, cooldown_until, risk },
    )
    .with_user(user_id);

    emit(sink, routing_keys::ANTIABUSE_TOO_FAST, event).await;
}

pub async fn publish_cooldown_active(
    sink: &dyn EventSink,
    user_id: i64,
    retry_after_sec: i64,
    cooldown_until: Option<DateTime<Utc>>,
) {
    let event = Event::new(
        SERVICE_NAME,
        event_names::ANTIABUSE_COOLDOWN_ACTIVE,
        payloads::Throttled { user_id, retry_after_sec, cooldown_until, risk: None },
    )
    .with_user(user_id);

    emit(sink, routing_keys::ANTIABUSE_COOLDOWN_ACTIVE, event).await;
}

pub async fn publish_match_created(sink: &dyn EventSink, actor_id: i64, target_id: i64, via_super_like: bool) {
    let (user_a_id, user_b_id) = (actor_id.min(target_id), actor_id.max(target_id));
    let event = Event::new(
        SERVICE_NAME,
        event_names::MATCH_CREATED,
        payloads::MatchCreated { user_a_id, user_b_id, via_super_like },
    )
    .with_user(actor_id);

    emit(sink, routing_keys::SWIPE_MATCH_CREATED, event).await;
}

pub async fn publish_moderation_decided(sink: &dyn EventSink, payload: payloads::ModerationDecided) {
    let user_id = payload.user_id;
    let event = Event::new(SERVICE_NAME, event_names::MODERATION_DECIDED, payload).with_user(user_id);

    emit(sink, routing_keys::MODERATION_DECIDED, event).await;
}

pub async fn publish_payment_succeeded(sink: &dyn EventSink, payload: payloads::PaymentSucceeded) {
    let user_id = payload.user_id;
    let event = Event::new(SERVICE_NAME, event_names::PAYMENT_SUCCEEDED, payload).with_user(user_id);

    emit(sink, routing_keys::PAYMENT_SUCCEEDED, event).await;
}

/// Forwards one client-reported event, stamped with the server receive time.
pub async fn publish_client_event(
    sink: &dyn EventSink,
    user_id: Option<i64>,
    payload: payloads::ClientEvent,
    received_at: DateTime<Utc>,
) {
    let mut event = Event::new(SERVICE_NAME, event_names::CLIENT_EVENT, payload).at(received_at);
    if let Some(user_id) = user_id {
        event = event.with_user(user_id);
    }

    emit(sink, routing_keys::CLIENT_EVENT, event).await;
}
