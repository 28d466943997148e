//! Behavioural risk: additive score with linear decay, escalating cooldowns
//! and the shadow flag. Scores live in the key-value store; see `kv::RiskStore`.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};

use crate::config::AntiAbuseConfig;
use crate::events::{publisher, EventSink};
use crate::kv::{CounterStore, KvResult, RiskState, RiskStore, Violation};

const DASHBOARD_TTL_SECS: i64 = 8 * 24 * 3600;

/// Dashboard counter names.
pub mod counters {
    pub const TOO_FAST: &str = "too_fast";
    pub const COOLDOWN_ACTIVE: &str = "cooldown_active";
    pub const LOW_CARD_VIEW: &str = "low_card_view";
    pub const SHADOW_ENABLED: &str = "shadow_enabled";
    pub const REPORT_LIMITED: &str = "report_limited";
}

impl RiskState {
    /// The state after the decay owed at `now`, as the risk scripts compute it.
    pub fn decayed(self, now: i64, decay_sec: i64) -> Self {
        let mut state = self;
        if state.risk > 0 && state.last_violation_at > 0 && now > state.last_violation_at && decay_sec > 0 {
            let decays = ((now - state.last_violation_at) / decay_sec).min(state.risk);
            state.risk -= decays;
            state.last_violation_at += decays * decay_sec;
        }
        state
    }

    pub fn is_shadow(&self, threshold: i64) -> bool {
        self.risk >= threshold
    }

    pub fn cooldown_active(&self, now: i64) -> bool {
        self.cooldown_until > now
    }

    pub fn cooldown_until_utc(&self) -> Option<DateTime<Utc>> {
        (self.cooldown_until > 0)
            .then(|| Utc.timestamp_opt(self.cooldown_until, 0).single())
            .flatten()
    }
}

/// Cooldown length for a violation that leaves the score at `risk`.
/// `forced_step` indexes the ladder directly.
pub fn cooldown_step(ladder: &[i64], risk: i64, forced_step: Option<i64>) -> i64 {
    if ladder.is_empty() {
        return 0;
    }
    let idx = match forced_step {
        Some(step) if step >= 0 => step + 1,
        _ => risk,
    };
    let idx = idx.clamp(1, ladder.len() as i64) as usize;
    ladder[idx - 1]
}

pub fn violation(cfg: &AntiAbuseConfig, weight: i64, forced_step: Option<i64>, now: DateTime<Utc>) -> Violation {
    Violation {
        weight: weight.max(1),
        now: now.timestamp(),
        decay_sec: cfg.decay,
        ladder: cfg.ladder.clone(),
        forced_step,
        ttl_sec: cfg.risk_ttl,
    }
}

/// Result of one recorded violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViolationOutcome {
    pub state: RiskState,
    /// The score went from below the shadow threshold to at or above it.
    pub crossed_shadow: bool,
}

pub fn crossed_threshold(after: &RiskState, weight: i64, threshold: i64) -> bool {
    after.risk - weight < threshold && after.risk >= threshold
}

pub async fn record_violation<K>(
    kv: &K,
    user_id: i64,
    weight: i64,
    forced_step: Option<i64>,
    cfg: &AntiAbuseConfig,
    now: DateTime<Utc>,
) -> KvResult<ViolationOutcome>
where
    K: RiskStore + ?Sized,
{
    let violation = violation(cfg, weight, forced_step, now);
    let state = kv.apply_violation(user_id, &violation).await?;
    let crossed_shadow = crossed_threshold(&state, violation.weight, cfg.shadow_threshold);

    tracing::debug!(
        user_id = %user_id,
        risk = state.risk,
        cooldown_until = state.cooldown_until,
        crossed_shadow,
        "risk violation recorded"
    );
    let kind = if forced_step.is_some() { "forced" } else { "ladder" };
    metrics::counter!("antiabuse_violations_total", "kind" => kind).increment(1);

    Ok(ViolationOutcome { state, crossed_shadow })
}

/// Current state with decay applied and persisted.
pub async fn current_state<K>(kv: &K, user_id: i64, cfg: &AntiAbuseConfig, now: DateTime<Utc>) -> KvResult<RiskState>
where
    K: RiskStore + ?Sized,
{
    kv.apply_decay(user_id, now.timestamp(), cfg.decay).await
}

/// Shadow flag per user, decayed locally without writing back.
pub async fn shadow_flags<K>(kv: &K, user_ids: &[i64], cfg: &AntiAbuseConfig, now: DateTime<Utc>) -> KvResult<Vec<bool>>
where
    K: RiskStore + ?Sized,
{
    let states = kv.risk_states(user_ids).await?;
    let now = now.timestamp();
    Ok(states
        .into_iter()
        .map(|s| s.decayed(now, cfg.decay).is_shadow(cfg.shadow_threshold))
        .collect())
}

/// Emits `antiabuse_shadow_enabled` for a crossing violation. Callers run
/// this after their database work has committed.
pub async fn announce_shadow<K>(
    kv: &K,
    sink: &dyn EventSink,
    user_id: i64,
    outcome: &ViolationOutcome,
    cfg: &AntiAbuseConfig,
    now: DateTime<Utc>,
) where
    K: CounterStore + ?Sized,
{
    if !outcome.crossed_shadow {
        return;
    }
    tracing::info!(user_id = %user_id, risk = outcome.state.risk, "shadow demotion enabled");
    publisher::publish_shadow_enabled(sink, user_id, outcome.state.risk, cfg.shadow_threshold).await;
    bump_dashboard(kv, counters::SHADOW_ENABLED, now).await;
}

pub fn dashboard_key(now: DateTime<Utc>) -> String {
    format!("antiabuse:dash:{}", now.format("%Y%m%d"))
}

/// Best effort; a failed bump is logged and dropped.
pub async fn bump_dashboard<K>(kv: &K, field: &str, now: DateTime<Utc>)
where
    K: CounterStore + ?Sized,
{
    if let Err(e) = kv.bump_counter(&dashboard_key(now), field, DASHBOARD_TTL_SECS).await {
        tracing::warn!(error = %e, field = %field, "failed to bump anti-abuse dashboard");
    }
}

pub async fn dashboard<K>(kv: &K, now: DateTime<Utc>) -> KvResult<HashMap<String, i64>>
where
    K: CounterStore + ?Sized,
{
    kv.counters(&dashboard_key(now)).await
}
