use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinHandle;

use amora_shared::errors::AppResult;

use crate::config::CleanupConfig;
use crate::store::{ModerationStore, ProfileStore};
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CleanupReport {
    pub locations_cleared: usize,
    pub leases_cleared: usize,
}

/// Forgets stale coordinates and frees moderation items whose lease ran out.
pub fn run_once<C>(conn: &mut C, cfg: &CleanupConfig, now: DateTime<Utc>) -> AppResult<CleanupReport>
where
    C: ProfileStore + ModerationStore,
{
    let cutoff = now - Duration::seconds(cfg.geo_retention);
    Ok(CleanupReport {
        locations_cleared: conn.clear_stale_locations(cutoff)?,
        leases_cleared: conn.clear_expired_leases(now)?,
    })
}

/// Runs `run_once` every `cleanup.interval`; ticks without a database are skipped.
pub fn spawn_cleanup_task(state: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = StdDuration::from_secs(state.config.cleanup.interval.max(1) as u64);
        let mut interval = tokio::time::interval(period);

        loop {
            interval.tick().await;

            let Some(pool) = state.db.as_ref() else {
                tracing::debug!("cleanup skipped, no database");
                continue;
            };
            let mut conn = match pool.get() {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(error = %e, "cleanup skipped, database unavailable");
                    continue;
                }
            };

            match run_once(&mut *conn, &state.config.cleanup, Utc::now()) {
                Ok(report) => tracing::info!(
                    locations_cleared = report.locations_cleared,
                    leases_cleared = report.leases_cleared,
                    "cleanup completed"
                ),
                Err(e) => tracing::error!(error = %e, "cleanup failed"),
            }
        }
    })
}
