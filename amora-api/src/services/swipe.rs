//! The swipe pipeline: anti-abuse gates, then one database transaction that
//! records the swipe and its like, match, quota and dislike effects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use amora_shared::errors::{AppError, AppResult, ErrorCode};
use amora_shared::types::event::payloads;

use crate::config::{AntiAbuseConfig, LimitsConfig};
use crate::events::{publisher, EventSink};
use crate::kv::{rate_window_key, CounterStore, RateWindowStore, RiskStore};
use crate::models::SwipeAction;
use crate::services::risk::{self, counters, ViolationOutcome};
use crate::services::{day, matchmaker, quota, rate_window};
use crate::store::{
    Consumed, DislikeStore, EntitlementStore, LikeStore, MatchStore, ProfileStore, QuotaStore,
    SwipeStore, Transactional,
};

#[derive(Debug, Clone, Deserialize)]
pub struct SwipeRequest {
    pub target_id: i64,
    pub action: String,
    #[serde(default)]
    pub client: ClientSignals,
}

/// Client-side measurements sent with a swipe.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientSignals {
    pub card_view_ms: Option<i64>,
    pub swipe_velocity: Option<f64>,
    pub screen: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SwipeQuota {
    pub likes_left: i32,
    pub reset_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub too_fast_retry_after: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SwipeResponse {
    pub ok: bool,
    pub match_created: bool,
    pub quota: SwipeQuota,
}

#[derive(Debug, Clone, Copy)]
pub struct SwipeSettings<'a> {
    pub limits: &'a LimitsConfig,
    pub antiabuse: &'a AntiAbuseConfig,
}

#[allow(clippy::too_many_arguments)]
pub async fn swipe<C, K>(
    conn: &mut C,
    kv: &K,
    sink: &dyn EventSink,
    settings: SwipeSettings<'_>,
    actor: i64,
    request: &SwipeRequest,
    tz: Option<&str>,
    now: DateTime<Utc>,
) -> AppResult<SwipeResponse>
where
    C: EntitlementStore
        + QuotaStore
        + SwipeStore
        + LikeStore
        + MatchStore
        + DislikeStore
        + ProfileStore
        + Transactional
        + Send,
    K: RiskStore + RateWindowStore + CounterStore + ?Sized,
{
    let target = request.target_id;
    if actor <= 0 || target <= 0 || actor == target {
        return Err(AppError::validation("target_id must be another user"));
    }
    let action = SwipeAction::parse(&request.action)
        .ok_or_else(|| AppError::validation("action must be LIKE, SUPERLIKE or DISLIKE"))?;
    let cfg = settings.antiabuse;

    if conn.find_profile(target)?.is_none() {
        return Err(AppError::not_found("target profile not found"));
    }
    let is_plus = quota::is_plus(conn, actor, now)?;

    if action.is_like() && is_plus {
        burst_gates(kv, sink, actor, cfg, now).await?;
    }

    // Announced before the transaction: the violation stays recorded even if the swipe fails.
    if action.is_like() {
        if let Some(outcome) = low_card_view(kv, sink, actor, target, action, &request.client, cfg, now).await {
            risk::announce_shadow(kv, sink, actor, &outcome, cfg, now).await;
        }
    }

    let day = day::day_key(tz, now);
    let like_limit = settings.limits.free_likes_per_day;
    let match_created = conn.in_transaction(|tx| match action {
        SwipeAction::Like | SwipeAction::Superlike => {
            let is_super = action == SwipeAction::Superlike;
            if is_super && !tx.consume_super_like(actor, now)? {
                return Err(AppError::new(
                    ErrorCode::SuperlikeRequirementsNotMet,
                    "a super-like needs a super-like credit and a like token",
                ));
            }
            if !is_plus {
                if let Consumed::LimitReached = tx.consume_like_with_limit(actor, &day, like_limit, now)? {
                    return Err(AppError::new(ErrorCode::LikeLimitReached, "daily like limit reached"));
                }
            }
            tx.create_swipe(actor, target, action, now)?;
            tx.upsert_like(actor, target, is_super, now)?;
            matchmaker::create_if_mutual(tx, actor, target, now)
        }
        SwipeAction::Dislike => {
            tx.create_swipe(actor, target, action, now)?;
            tx.record_dislike(actor, target, now)?;
            Ok(false)
        }
    })?;

    metrics::counter!("swipes_total", "action" => action.as_str()).increment(1);
    tracing::info!(
        actor_id = %actor,
        target_id = %target,
        action = action.as_str(),
        match_created,
        "swipe recorded"
    );

    if match_created {
        publisher::publish_match_created(sink, actor, target, action == SwipeAction::Superlike).await;
    }

    let snapshot = quota::snapshot_for(conn, actor, is_plus, &day, settings.limits)?;
    let too_fast_retry_after = if is_plus {
        next_like_wait(kv, actor, cfg).await
    } else {
        None
    };

    Ok(SwipeResponse {
        ok: true,
        match_created,
        quota: SwipeQuota {
            likes_left: snapshot.likes_left,
            reset_at: snapshot.reset_at,
            too_fast_retry_after,
        },
    })
}

/// Cooldown check, then the velocity windows. A breach records a violation.
async fn burst_gates<K>(
    kv: &K,
    sink: &dyn EventSink,
    actor: i64,
    cfg: &AntiAbuseConfig,
    now: DateTime<Utc>,
) -> AppResult<()>
where
    K: RiskStore + RateWindowStore + CounterStore + ?Sized,
{
    let state = risk::current_state(kv, actor, cfg, now).await.map_err(|e| {
        tracing::error!(error = %e, user_id = %actor, "risk store unavailable");
        AppError::temp_unavailable("anti-abuse store unavailable")
    })?;

    let now_ts = now.timestamp();
    if state.cooldown_active(now_ts) {
        let retry = state.cooldown_until - now_ts;
        let until = state.cooldown_until_utc();
        publisher::publish_cooldown_active(sink, actor, retry, until).await;
        risk::bump_dashboard(kv, counters::COOLDOWN_ACTIVE, now).await;
        return Err(AppError::throttled(ErrorCode::CooldownActive, "cooldown is active", retry, until));
    }

    let Some(window_retry) = rate_window::check_like_burst(kv, actor, cfg).await? else {
        return Ok(());
    };

    let outcome = risk::record_violation(kv, actor, 1, None, cfg, now)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, user_id = %actor, "risk store unavailable");
            AppError::temp_unavailable("anti-abuse store unavailable")
        })?;

    let until = outcome.state.cooldown_until_utc();
    let retry = window_retry.max(outcome.state.cooldown_until - now_ts);
    tracing::warn!(user_id = %actor, retry_after_sec = retry, risk = outcome.state.risk, "like burst rejected");

    publisher::publish_too_fast(sink, actor, retry, until, Some(outcome.state.risk)).await;
    risk::bump_dashboard(kv, counters::TOO_FAST, now).await;
    risk::announce_shadow(kv, sink, actor, &outcome, cfg, now).await;

    Err(AppError::throttled(ErrorCode::TooFast, "too many likes, slow down", retry, until))
}

/// Likes decided faster than a card can be read count as a fixed-step
/// violation. Never fails the swipe.
#[allow(clippy::too_many_arguments)]
async fn low_card_view<K>(
    kv: &K,
    sink: &dyn EventSink,
    actor: i64,
    target: i64,
    action: SwipeAction,
    client: &ClientSignals,
    cfg: &AntiAbuseConfig,
    now: DateTime<Utc>,
) -> Option<ViolationOutcome>
where
    K: RiskStore + CounterStore + ?Sized,
{
    let card_view_ms = client.card_view_ms?;
    if card_view_ms >= cfg.min_card_view_ms {
        return None;
    }

    let outcome = match risk::record_violation(kv, actor, 1, Some(0), cfg, now).await {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            tracing::warn!(error = %e, user_id = %actor, "failed to record low card view");
            None
        }
    };

    publisher::publish_low_card_view(
        sink,
        payloads::LowCardView {
            user_id: actor,
            target_id: target,
            action: action.as_str().to_string(),
            card_view_ms,
            min_card_view_ms: cfg.min_card_view_ms,
            swipe_velocity: client.swipe_velocity,
            screen: client.screen.clone(),
        },
    )
    .await;
    risk::bump_dashboard(kv, counters::LOW_CARD_VIEW, now).await;
    outcome
}

/// Seconds until the 10-second window lets another like through, if it is full.
async fn next_like_wait<K>(kv: &K, actor: i64, cfg: &AntiAbuseConfig) -> Option<i64>
where
    K: RateWindowStore + ?Sized,
{
    let key = rate_window_key("swipe", actor, "10s");
    match kv.window_state(&key).await {
        Ok(state) if state.count >= cfg.likes_per_10_seconds => Some(state.retry_after_secs()),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(error = %e, user_id = %actor, "failed to read like window");
            None
        }
    }
}
