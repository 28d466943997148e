use amora_shared::errors::{AppError, AppResult};

use crate::config::AntiAbuseConfig;
use crate::kv::{rate_window_key, RateWindowStore, WindowState};

/// Outcome of one fixed-window check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowVerdict {
    pub allowed: bool,
    pub count: i64,
    pub retry_after_sec: i64,
}

impl WindowVerdict {
    fn from_state(state: WindowState, limit: i64) -> Self {
        let allowed = state.count <= limit;
        Self {
            allowed,
            count: state.count,
            retry_after_sec: if allowed { 0 } else { state.retry_after_secs() },
        }
    }
}

/// Counts one attempt. An unreachable store is an error, never an allow.
pub async fn allow<K>(
    kv: &K,
    scope: &str,
    user_id: i64,
    label: &str,
    window_secs: i64,
    limit: i64,
) -> AppResult<WindowVerdict>
where
    K: RateWindowStore + ?Sized,
{
    let key = rate_window_key(scope, user_id, label);
    let state = kv.allow(&key, window_secs).await.map_err(|e| {
        tracing::error!(error = %e, key = %key, "rate window unavailable");
        AppError::temp_unavailable("rate limiter unavailable")
    })?;
    Ok(WindowVerdict::from_state(state, limit))
}

/// Per-minute and per-10-second like windows. `Some(retry)` when either is
/// breached; the longer wait wins.
pub async fn check_like_burst<K>(kv: &K, user_id: i64, cfg: &AntiAbuseConfig) -> AppResult<Option<i64>>
where
    K: RateWindowStore + ?Sized,
{
    let minute = allow(kv, "swipe", user_id, "1m", 60, cfg.likes_per_minute).await?;
    let burst = allow(kv, "swipe", user_id, "10s", 10, cfg.likes_per_10_seconds).await?;

    if minute.allowed && burst.allowed {
        return Ok(None);
    }
    Ok(Some(minute.retry_after_sec.max(burst.retry_after_sec)))
}

/// Hourly report allowance per reporter.
pub async fn check_report<K>(kv: &K, user_id: i64, cfg: &AntiAbuseConfig) -> AppResult<WindowVerdict>
where
    K: RateWindowStore + ?Sized,
{
    allow(kv, "report", user_id, "1h", 3600, cfg.reports_per_hour).await
}
