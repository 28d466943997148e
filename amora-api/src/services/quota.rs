use chrono::{DateTime, Utc};
use serde::Serialize;

use amora_shared::errors::AppResult;

use crate::config::LimitsConfig;
use crate::services::day::{self, DayKey};
use crate::store::{EntitlementStore, QuotaStore};

/// Reported instead of a count when likes are not metered.
pub const UNLIMITED: i32 = -1;

pub fn is_plus<C: EntitlementStore>(conn: &mut C, user_id: i64, now: DateTime<Utc>) -> AppResult<bool> {
    Ok(conn.entitlement(user_id)?.map_or(false, |e| e.is_plus(now)))
}

pub fn rewind_limit(limits: &LimitsConfig, is_plus: bool) -> i32 {
    if is_plus {
        limits.plus_rewinds_per_day
    } else {
        limits.free_rewinds_per_day
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QuotaSnapshot {
    pub is_plus: bool,
    pub likes_left: i32,
    pub likes_limit: i32,
    pub rewinds_left: i32,
    pub reset_at: DateTime<Utc>,
    pub day_key: String,
}

pub fn snapshot<C>(
    conn: &mut C,
    user_id: i64,
    tz: Option<&str>,
    limits: &LimitsConfig,
    now: DateTime<Utc>,
) -> AppResult<QuotaSnapshot>
where
    C: EntitlementStore + QuotaStore,
{
    let plus = is_plus(conn, user_id, now)?;
    let day = day::day_key(tz, now);
    snapshot_for(conn, user_id, plus, &day, limits)
}

/// Snapshot when plus status and the day are already known.
pub fn snapshot_for<C: QuotaStore>(
    conn: &mut C,
    user_id: i64,
    is_plus: bool,
    day: &DayKey,
    limits: &LimitsConfig,
) -> AppResult<QuotaSnapshot> {
    let usage = conn.quota_usage(user_id, day.day)?;
    let (likes_used, rewind_used) = usage.map_or((0, 0), |u| (u.likes_used, u.rewind_used));

    let (likes_left, likes_limit) = if is_plus {
        (UNLIMITED, UNLIMITED)
    } else {
        let limit = limits.free_likes_per_day;
        ((limit - likes_used).max(0), limit)
    };

    Ok(QuotaSnapshot {
        is_plus,
        likes_left,
        likes_limit,
        rewinds_left: (rewind_limit(limits, is_plus) - rewind_used).max(0),
        reset_at: day.reset_at,
        day_key: day.key(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Consumed, QuotaStore};
    use crate::testing::MemoryDb;
    use chrono::{Duration, TimeZone};

    #[test]
    fn free_user_counts_down_and_resets_next_day() {
        let mut db = MemoryDb::default();
        let limits = LimitsConfig { free_likes_per_day: 3, ..LimitsConfig::default() };
        let now = Utc.with_ymd_and_hms(2026, 2, 9, 10, 0, 0).unwrap();
        let day = day::day_key(None, now);

        for expected in 1..=3 {
            assert_eq!(db.consume_like_with_limit(1, &day, 3, now).unwrap(), Consumed::Used(expected));
        }
        assert_eq!(db.consume_like_with_limit(1, &day, 3, now).unwrap(), Consumed::LimitReached);

        let snap = snapshot(&mut db, 1, None, &limits, now).unwrap();
        assert_eq!(snap.likes_left, 0);
        assert_eq!(snap.likes_limit, 3);
        assert_eq!(snap.rewinds_left, 1);
        assert_eq!(snap.day_key, "2026-02-09");

        let tomorrow = snap.reset_at + Duration::seconds(1);
        let next = snapshot(&mut db, 1, None, &limits, tomorrow).unwrap();
        assert_eq!(next.likes_left, 3);
        assert_eq!(next.day_key, "2026-02-10");
    }

    #[test]
    fn refund_saturates_at_zero() {
        let mut db = MemoryDb::default();
        let now = Utc.with_ymd_and_hms(2026, 2, 9, 10, 0, 0).unwrap();
        let day = day::day_key(None, now);

        db.consume_like_with_limit(1, &day, 3, now).unwrap();
        db.refund_like(1, day.day, now).unwrap();
        db.refund_like(1, day.day, now).unwrap();
        assert_eq!(db.quota_usage(1, day.day).unwrap().unwrap().likes_used, 0);
    }

    #[test]
    fn plus_reports_unlimited_likes() {
        let mut db = MemoryDb::default();
        let now = Utc::now();
        db.grant_plus(1, now + Duration::days(30));
        let snap = snapshot(&mut db, 1, Some("Europe/Minsk"), &LimitsConfig::default(), now).unwrap();
        assert!(snap.is_plus);
        assert_eq!(snap.likes_left, UNLIMITED);
        assert_eq!(snap.rewinds_left, 10);
    }
}
