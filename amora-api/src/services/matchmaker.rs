use chrono::{DateTime, Utc};
use serde::Serialize;

use amora_shared::errors::AppResult;
use amora_shared::types::{Paginated, PaginationParams};

use crate::models::MatchPair;
use crate::services::profile::ProfileCard;
use crate::store::{LikeStore, MatchStore, ProfileStore, Transactional};

/// Creates the pair's match when `target` already likes `actor`. True only
/// when this call produced an active row.
pub fn create_if_mutual<C>(conn: &mut C, actor: i64, target: i64, now: DateTime<Utc>) -> AppResult<bool>
where
    C: LikeStore + MatchStore,
{
    if conn.find_like(target, actor)?.is_none() {
        return Ok(false);
    }
    conn.create_match(MatchPair::new(actor, target), now)
}

/// Marks the match removed and drops both likes, so only a fresh mutual
/// like brings it back.
pub fn unmatch<C>(conn: &mut C, user_id: i64, target: i64, now: DateTime<Utc>) -> AppResult<bool>
where
    C: LikeStore + MatchStore + Transactional,
{
    let removed = conn.in_transaction(|tx| {
        let removed = tx.remove_match(MatchPair::new(user_id, target), now)?;
        tx.delete_like(user_id, target)?;
        tx.delete_like(target, user_id)?;
        Ok(removed)
    })?;

    tracing::info!(user_id = %user_id, target_id = %target, removed, "unmatch");
    Ok(removed)
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchView {
    pub match_id: i64,
    pub matched_at: DateTime<Utc>,
    pub user: Option<ProfileCard>,
}

pub fn list_matches<C>(
    conn: &mut C,
    user_id: i64,
    params: &PaginationParams,
    now: DateTime<Utc>,
) -> AppResult<Paginated<MatchView>>
where
    C: MatchStore + ProfileStore,
{
    let rows = conn.list_active_matches(user_id, params.limit() as i64 + 1, params.offset() as i64)?;

    let mut views = Vec::with_capacity(rows.len());
    for m in rows {
        let other = m.pair().other(user_id);
        let user = conn.find_profile(other)?.map(|p| ProfileCard::from_profile(&p, now));
        views.push(MatchView {
            match_id: m.id,
            matched_at: m.updated_at,
            user,
        });
    }
    Ok(Paginated::new(views, params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryDb;

    #[test]
    fn one_sided_like_is_not_a_match() {
        let mut db = MemoryDb::default();
        let now = Utc::now();
        db.upsert_like(101, 202, false, now).unwrap();
        assert!(!create_if_mutual(&mut db, 101, 202, now).unwrap());
        assert_eq!(db.match_count(), 0);
    }

    #[test]
    fn reciprocal_likes_make_one_canonical_match() {
        let mut db = MemoryDb::default();
        let now = Utc::now();
        db.upsert_like(202, 101, false, now).unwrap();
        db.upsert_like(101, 202, false, now).unwrap();

        assert!(create_if_mutual(&mut db, 101, 202, now).unwrap());
        assert!(!create_if_mutual(&mut db, 202, 101, now).unwrap());

        let m = db.match_for(MatchPair::new(202, 101)).unwrap();
        assert_eq!((m.user_a_id, m.user_b_id), (101, 202));
        assert_eq!(db.match_count(), 1);
    }

    #[test]
    fn unmatch_then_mutual_like_reactivates() {
        let mut db = MemoryDb::default();
        let now = Utc::now();
        db.upsert_like(1, 2, false, now).unwrap();
        db.upsert_like(2, 1, false, now).unwrap();
        assert!(create_if_mutual(&mut db, 1, 2, now).unwrap());

        assert!(unmatch(&mut db, 2, 1, now).unwrap());
        assert!(db.find_like(1, 2).unwrap().is_none());
        assert_eq!(db.match_for(MatchPair::new(1, 2)).unwrap().status, "removed");

        db.upsert_like(1, 2, false, now).unwrap();
        assert!(!create_if_mutual(&mut db, 1, 2, now).unwrap());
        db.upsert_like(2, 1, false, now).unwrap();
        assert!(create_if_mutual(&mut db, 2, 1, now).unwrap());
        assert_eq!(db.match_for(MatchPair::new(1, 2)).unwrap().status, "active");
        assert_eq!(db.match_count(), 1);
    }

    #[test]
    fn matches_list_counterpart_cards() {
        let mut db = MemoryDb::default();
        let now = Utc::now();
        db.seed_profile(2, |p| p.display_name = "Bea".into());
        db.seed_profile(3, |_| {});
        for other in [2, 3] {
            db.upsert_like(1, other, false, now).unwrap();
            db.upsert_like(other, 1, false, now).unwrap();
            create_if_mutual(&mut db, 1, other, now).unwrap();
        }

        let params = PaginationParams { page: 1, per_page: 1 };
        let page = list_matches(&mut db, 1, &params, now).unwrap();
        assert_eq!(page.items.len(), 1);
        assert!(page.has_more);

        let all = list_matches(&mut db, 1, &PaginationParams::default(), now).unwrap();
        let names: Vec<String> = all.items.iter().filter_map(|m| m.user.as_ref()).map(|u| u.display_name.clone()).collect();
        assert!(names.contains(&"Bea".to_string()));
    }
}
