use chrono::{DateTime, Utc};
use serde::Deserialize;
use validator::Validate;

use amora_shared::errors::{AppError, AppResult, ErrorCode};

use crate::config::AntiAbuseConfig;
use crate::kv::{CounterStore, RateWindowStore};
use crate::models::{MatchPair, Report};
use crate::services::rate_window;
use crate::services::risk::{self, counters};
use crate::store::{MatchStore, SafetyStore, Transactional};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BlockRequest {
    #[validate(range(min = 1))]
    pub target_id: i64,
    #[validate(length(max = 256))]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReportRequest {
    #[validate(range(min = 1))]
    pub target_id: i64,
    #[validate(length(min = 1, max = 64, message = "reason is required"))]
    pub reason: String,
    #[validate(length(max = 2000))]
    pub details: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TargetRequest {
    #[validate(range(min = 1))]
    pub target_id: i64,
}

pub fn check_target(user_id: i64, target: i64) -> AppResult<()> {
    if user_id == target {
        return Err(AppError::validation("cannot target yourself"));
    }
    Ok(())
}

/// Blocks `target` and retires any active match between the two.
pub fn block<C>(conn: &mut C, user_id: i64, req: &BlockRequest, now: DateTime<Utc>) -> AppResult<()>
where
    C: SafetyStore + MatchStore + Transactional,
{
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;
    check_target(user_id, req.target_id)?;

    let reason = req.reason.as_deref().map(str::trim).filter(|r| !r.is_empty());
    conn.in_transaction(|tx| {
        tx.upsert_block(user_id, req.target_id, reason, now)?;
        tx.remove_match(MatchPair::new(user_id, req.target_id), now)?;
        Ok(())
    })?;

    tracing::info!(user_id = %user_id, target_id = %req.target_id, "user blocked");
    Ok(())
}

pub async fn report<C, K>(
    conn: &mut C,
    kv: &K,
    cfg: &AntiAbuseConfig,
    user_id: i64,
    req: &ReportRequest,
    now: DateTime<Utc>,
) -> AppResult<Report>
where
    C: SafetyStore + Transactional + Send,
    K: RateWindowStore + CounterStore + ?Sized,
{
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;
    check_target(user_id, req.target_id)?;

    let verdict = rate_window::check_report(kv, user_id, cfg).await?;
    if !verdict.allowed {
        risk::bump_dashboard(kv, counters::REPORT_LIMITED, now).await;
        return Err(AppError::throttled(
            ErrorCode::TooFast,
            "too many reports, try again later",
            verdict.retry_after_sec,
            None,
        ));
    }

    let reason = req.reason.trim().to_uppercase();
    let details = req.details.as_deref().map(str::trim).filter(|d| !d.is_empty());
    let report = conn.in_transaction(|tx| {
        let report = tx.create_report(user_id, req.target_id, &reason, details, now)?;
        tx.increment_reports_count(req.target_id)?;
        Ok(report)
    })?;

    tracing::info!(
        report_id = %report.id,
        reporter_id = %user_id,
        target_id = %req.target_id,
        reason = %report.reason,
        "report filed"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LikeStore, MatchStore};
    use crate::services::matchmaker;
    use crate::testing::{MemoryDb, MemoryKv};

    #[test]
    fn block_removes_active_match() {
        let mut db = MemoryDb::default();
        let now = Utc::now();
        db.upsert_like(1, 2, false, now).unwrap();
        db.upsert_like(2, 1, false, now).unwrap();
        matchmaker::create_if_mutual(&mut db, 1, 2, now).unwrap();

        let req = BlockRequest { target_id: 2, reason: Some(" rude ".into()) };
        block(&mut db, 1, &req, now).unwrap();

        assert!(db.has_block(1, 2));
        assert!(db.list_active_matches(1, 10, 0).unwrap().is_empty());
    }

    #[test]
    fn cannot_block_self() {
        let mut db = MemoryDb::default();
        let req = BlockRequest { target_id: 1, reason: None };
        let err = block(&mut db, 1, &req, Utc::now()).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn reports_count_up_and_are_rate_limited() {
        let mut db = MemoryDb::default();
        let kv = MemoryKv::default();
        let cfg = AntiAbuseConfig { reports_per_hour: 2, ..AntiAbuseConfig::default() };
        db.seed_profile(2, |_| {});
        let req = ReportRequest { target_id: 2, reason: "spam".into(), details: None };

        let first = report(&mut db, &kv, &cfg, 1, &req, Utc::now()).await.unwrap();
        assert_eq!(first.reason, "SPAM");
        assert_eq!(first.status, "OPEN");
        report(&mut db, &kv, &cfg, 1, &req, Utc::now()).await.unwrap();

        let err = report(&mut db, &kv, &cfg, 1, &req, Utc::now()).await.unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::TooFast);
        assert_eq!(db.profile(2).unwrap().reports_count, 2);
    }

    #[tokio::test]
    async fn report_limiter_outage_is_temp_unavailable() {
        let mut db = MemoryDb::default();
        let kv = MemoryKv::default();
        kv.fail(true);
        let req = ReportRequest { target_id: 2, reason: "spam".into(), details: None };
        let err = report(&mut db, &kv, &AntiAbuseConfig::default(), 1, &req, Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::TempUnavailable);
    }
}
