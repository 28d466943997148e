use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use amora_shared::errors::{AppError, AppResult, ErrorCode};
use amora_shared::types::event::payloads;

use crate::events::{publisher, EventSink};
use crate::models::{ModerationItem, ModerationStatus, Profile};
use crate::store::{Decision, ModerationStore, ProfileStore, Transactional};

/// Expected review latency, derived from the PENDING queue depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtaBucket {
    UpTo10,
    UpTo20,
    UpTo30,
    UpTo40,
    UpTo50,
    MoreThanHour,
}

impl EtaBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UpTo10 => "up_to_10",
            Self::UpTo20 => "up_to_20",
            Self::UpTo30 => "up_to_30",
            Self::UpTo40 => "up_to_40",
            Self::UpTo50 => "up_to_50",
            Self::MoreThanHour => "more_than_hour",
        }
    }
}

/// Status reported for users that never submitted a profile.
pub const NO_STATUS: &str = "NONE";

pub fn eta_bucket(pending: i64) -> EtaBucket {
    match pending {
        p if p >= 50 => EtaBucket::MoreThanHour,
        p if p <= 10 => EtaBucket::UpTo10,
        11..=20 => EtaBucket::UpTo20,
        21..=30 => EtaBucket::UpTo30,
        31..=40 => EtaBucket::UpTo40,
        _ => EtaBucket::UpTo50,
    }
}

/// The caller's view of their own review.
#[derive(Debug, Clone, Serialize)]
pub struct ModerationStatusView {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_bucket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_fix_step: Option<String>,
}

/// Latest item for the user. Reading a PENDING item refreshes its ETA.
pub fn status_for_user<C>(conn: &mut C, user_id: i64, now: DateTime<Utc>) -> AppResult<ModerationStatusView>
where
    C: ModerationStore + ProfileStore,
{
    let Some(mut item) = conn.latest_item(user_id)? else {
        let status = conn
            .find_profile(user_id)?
            .map(|p| p.moderation_status)
            .unwrap_or_else(|| NO_STATUS.to_string());
        return Ok(ModerationStatusView {
            status,
            eta_bucket: None,
            reason_code: None,
            reason_text: None,
            required_fix_step: None,
        });
    };

    if item.moderation_status() == Some(ModerationStatus::Pending) {
        let eta = eta_bucket(conn.pending_count()?);
        if item.eta_bucket != eta.as_str() {
            conn.set_eta_bucket(item.id, eta, now)?;
            item.eta_bucket = eta.as_str().to_string();
        }
    }

    let pending = item.moderation_status() == Some(ModerationStatus::Pending);
    Ok(ModerationStatusView {
        status: item.status,
        eta_bucket: pending.then_some(item.eta_bucket),
        reason_code: item.reason_code,
        reason_text: item.reason_text,
        required_fix_step: item.required_fix_step,
    })
}

/// An item with the profile it concerns, as shown to a moderator.
#[derive(Debug, Clone, Serialize)]
pub struct QueueEntry {
    pub item: ModerationItem,
    pub profile: Option<Profile>,
}

pub fn acquire_next<C>(conn: &mut C, actor: i64, lease_secs: i64, now: DateTime<Utc>) -> AppResult<Option<QueueEntry>>
where
    C: ModerationStore + ProfileStore,
{
    let lease_until = now + Duration::seconds(lease_secs);
    let Some(item) = conn.acquire_next_pending(actor, now, lease_until)? else {
        return Ok(None);
    };

    tracing::info!(item_id = %item.id, actor_id = %actor, "moderation item leased");
    let profile = conn.find_profile(item.user_id)?;
    Ok(Some(QueueEntry { item, profile }))
}

pub fn item_snapshot<C>(conn: &mut C, item_id: i64) -> AppResult<QueueEntry>
where
    C: ModerationStore + ProfileStore,
{
    let item = conn
        .find_item(item_id)?
        .ok_or_else(|| AppError::not_found("moderation item not found"))?;
    let profile = conn.find_profile(item.user_id)?;
    Ok(QueueEntry { item, profile })
}

pub fn release<C: ModerationStore>(conn: &mut C, actor: i64, item_id: i64, now: DateTime<Utc>) -> AppResult<bool> {
    if conn.find_item(item_id)?.is_none() {
        return Err(AppError::not_found("moderation item not found"));
    }
    conn.release_lease(item_id, actor, now)
}

/// Builds a rejection, checking the reason against the allowlist.
pub fn rejection(
    reason_code: &str,
    reason_text: &str,
    required_fix_step: &str,
    allowed: &[String],
) -> AppResult<Decision> {
    let reason_code = reason_code.trim().to_uppercase();
    if reason_code.is_empty() || !allowed.iter().any(|r| r.eq_ignore_ascii_case(&reason_code)) {
        return Err(AppError::validation("reason_code is not an allowed rejection reason"));
    }
    if reason_text.trim().is_empty() || required_fix_step.trim().is_empty() {
        return Err(AppError::validation("reason_text and required_fix_step are required"));
    }
    Ok(Decision::Reject {
        reason_code,
        reason_text: reason_text.trim().to_string(),
        required_fix_step: required_fix_step.trim().to_string(),
    })
}

/// Approves or rejects an item and mirrors the outcome onto the profile.
pub async fn decide<C>(
    conn: &mut C,
    sink: &dyn EventSink,
    actor: i64,
    item_id: i64,
    decision: Decision,
    now: DateTime<Utc>,
) -> AppResult<ModerationItem>
where
    C: ModerationStore + ProfileStore + Transactional + Send,
{
    let item = conn.in_transaction(|tx| {
        let Some(item) = tx.decide(item_id, actor, &decision, now)? else {
            return Err(decide_failure(tx, item_id, actor, now)?);
        };

        tx.set_moderation_outcome(item.user_id, decision.status(), now)?;
        let eta = eta_bucket(tx.pending_count()?);
        tx.update_pending_eta(eta, now)?;
        Ok(item)
    })?;

    tracing::info!(
        item_id = %item.id,
        user_id = %item.user_id,
        actor_id = %actor,
        status = %item.status,
        "moderation decision recorded"
    );

    publisher::publish_moderation_decided(
        sink,
        payloads::ModerationDecided {
            item_id: item.id,
            user_id: item.user_id,
            status: item.status.clone(),
            actor_id: actor,
            reason_code: item.reason_code.clone(),
        },
    )
    .await;

    Ok(item)
}

/// Explains why a conditional decision matched no row.
fn decide_failure<C: ModerationStore>(
    conn: &mut C,
    item_id: i64,
    actor: i64,
    now: DateTime<Utc>,
) -> AppResult<AppError> {
    let Some(item) = conn.find_item(item_id)? else {
        return Ok(AppError::not_found("moderation item not found"));
    };
    if item.moderation_status() != Some(ModerationStatus::Pending) {
        return Ok(AppError::new(ErrorCode::Conflict, "moderation item is already decided"));
    }
    if item.leased_by_other(actor, now) {
        return Ok(AppError::new(ErrorCode::Conflict, "moderation item is leased by another moderator"));
    }
    Ok(AppError::new(ErrorCode::Conflict, "moderation item changed concurrently"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ModerationStore;
    use crate::testing::{CaptureSink, MemoryDb};
    use chrono::TimeZone;

    fn reasons() -> Vec<String> {
        crate::config::AppConfig::default().moderation.reject_reasons
    }

    #[test]
    fn eta_bucket_boundaries() {
        let cases = [
            (0, "up_to_10"),
            (3, "up_to_10"),
            (10, "up_to_10"),
            (11, "up_to_20"),
            (20, "up_to_20"),
            (21, "up_to_30"),
            (31, "up_to_40"),
            (40, "up_to_40"),
            (41, "up_to_50"),
            (49, "up_to_50"),
            (50, "more_than_hour"),
            (500, "more_than_hour"),
        ];
        for (pending, bucket) in cases {
            assert_eq!(eta_bucket(pending).as_str(), bucket, "{pending}");
        }
    }

    #[test]
    fn rejection_requires_allowed_reason_and_texts() {
        assert!(rejection("nsfw", "explicit photo", "replace photo", &reasons()).is_ok());
        assert!(rejection("BORING", "x", "y", &reasons()).is_err());
        assert!(rejection("NSFW", " ", "y", &reasons()).is_err());
        assert!(rejection("NSFW", "x", "", &reasons()).is_err());
    }

    #[tokio::test]
    async fn lease_acquire_and_approve() {
        let now = Utc.with_ymd_and_hms(2026, 2, 9, 12, 0, 0).unwrap();
        let mut db = MemoryDb::default();
        let sink = CaptureSink::default();
        for user in [500, 501, 502] {
            db.seed_profile(user, |_| {});
        }
        let first = db.enqueue(500, "profile", None, eta_bucket(3), now).unwrap();
        db.enqueue(501, "profile", None, eta_bucket(3), now + Duration::seconds(1)).unwrap();
        assert_eq!(first.eta_bucket, "up_to_10");

        let leased = acquire_next(&mut db, 900, 300, now).unwrap().unwrap();
        assert_eq!(leased.item.id, first.id);
        assert_eq!(leased.item.locked_by, Some(900));
        assert_eq!(leased.profile.unwrap().user_id, 500);

        let other = acquire_next(&mut db, 901, 300, now).unwrap().unwrap();
        assert_ne!(other.item.id, first.id);
        assert!(acquire_next(&mut db, 902, 300, now).unwrap().is_none());

        // A second moderator cannot decide a leased item.
        let err = decide(&mut db, &sink, 901, first.id, Decision::Approve, now).await.unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::Conflict);

        let approved = decide(&mut db, &sink, 900, first.id, Decision::Approve, now).await.unwrap();
        assert_eq!(approved.status, "APPROVED");
        assert_eq!(approved.moderator_actor_id, Some(900));
        assert_eq!(approved.locked_by, None);

        let profile = db.profile(500).unwrap();
        assert!(profile.approved);
        assert_eq!(profile.moderation_status, "APPROVED");
        assert_eq!(sink.names(), vec!["moderation_decided"]);

        let again = decide(&mut db, &sink, 900, first.id, Decision::Approve, now).await.unwrap_err();
        assert_eq!(again.error_code(), ErrorCode::Conflict);
    }

    #[tokio::test]
    async fn expired_lease_can_be_taken_over() {
        let now = Utc.with_ymd_and_hms(2026, 2, 9, 12, 0, 0).unwrap();
        let mut db = MemoryDb::default();
        let sink = CaptureSink::default();
        db.seed_profile(500, |_| {});
        let item = db.enqueue(500, "profile", None, EtaBucket::UpTo10, now).unwrap();

        acquire_next(&mut db, 900, 300, now).unwrap().unwrap();
        let later = now + Duration::seconds(301);
        let taken = acquire_next(&mut db, 901, 300, later).unwrap().unwrap();
        assert_eq!(taken.item.id, item.id);
        assert_eq!(taken.item.locked_by, Some(901));

        let decision = rejection("PHOTO_NO_FACE", "no face visible", "upload a clear portrait", &reasons()).unwrap();
        let rejected = decide(&mut db, &sink, 901, item.id, decision, later).await.unwrap();
        assert_eq!(rejected.status, "REJECTED");
        assert_eq!(rejected.reason_code.as_deref(), Some("PHOTO_NO_FACE"));
        assert!(!db.profile(500).unwrap().approved);
        assert_eq!(db.profile(500).unwrap().moderation_status, "REJECTED");
    }

    #[test]
    fn pending_status_read_refreshes_eta() {
        let now = Utc.with_ymd_and_hms(2026, 2, 9, 12, 0, 0).unwrap();
        let mut db = MemoryDb::default();
        db.seed_profile(500, |_| {});
        let item = db.enqueue(500, "profile", None, EtaBucket::MoreThanHour, now).unwrap();

        let view = status_for_user(&mut db, 500, now).unwrap();
        assert_eq!(view.status, "PENDING");
        assert_eq!(view.eta_bucket.as_deref(), Some("up_to_10"));
        assert_eq!(db.find_item(item.id).unwrap().unwrap().eta_bucket, "up_to_10");
    }

    #[test]
    fn release_only_by_holder() {
        let now = Utc::now();
        let mut db = MemoryDb::default();
        db.seed_profile(500, |_| {});
        let item = db.enqueue(500, "profile", None, EtaBucket::UpTo10, now).unwrap();
        acquire_next(&mut db, 900, 300, now).unwrap();

        assert!(!release(&mut db, 901, item.id, now).unwrap());
        assert!(release(&mut db, 900, item.id, now).unwrap());
        assert!(release(&mut db, 900, 999, now).is_err());
    }
}
