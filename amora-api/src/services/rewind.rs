use chrono::{DateTime, Utc};
use serde::Serialize;

use amora_shared::errors::{AppError, AppResult, ErrorCode};

use crate::config::LimitsConfig;
use crate::models::{MatchPair, SwipeAction};
use crate::services::{day, quota};
use crate::store::{
    Consumed, DislikeStore, EntitlementStore, LikeStore, MatchStore, QuotaStore, SwipeStore,
    Transactional,
};

#[derive(Debug, Clone, Serialize)]
pub struct RewindResponse {
    pub ok: bool,
    pub undone_action: String,
    pub undone_target_id: i64,
    pub rewinds_left: i32,
}

/// Undoes the caller's most recent swipe, spending one rewind.
pub fn rewind<C>(
    conn: &mut C,
    actor: i64,
    tz: Option<&str>,
    limits: &LimitsConfig,
    now: DateTime<Utc>,
) -> AppResult<RewindResponse>
where
    C: EntitlementStore + QuotaStore + SwipeStore + LikeStore + MatchStore + DislikeStore + Transactional,
{
    let is_plus = quota::is_plus(conn, actor, now)?;
    let limit = quota::rewind_limit(limits, is_plus);
    let today = day::day_key(tz, now);

    let (swipe, used) = conn.in_transaction(|tx| {
        let used = match tx.consume_rewind_with_limit(actor, &today, limit, now)? {
            Consumed::Used(used) => used,
            Consumed::LimitReached => {
                return Err(AppError::new(ErrorCode::RewindLimitReached, "daily rewind limit reached"));
            }
        };

        let swipe = tx
            .last_swipe_by_actor(actor)?
            .ok_or_else(|| AppError::new(ErrorCode::NothingToRewind, "nothing to rewind"))?;
        let action = swipe
            .swipe_action()
            .ok_or_else(|| AppError::internal(format!("stored swipe has unknown action {}", swipe.action)))?;
        let target = swipe.target_user_id;
        // Likes are refunded to the day they were spent on.
        let swipe_day = day::local_day(tz, swipe.created_at);

        match action {
            SwipeAction::Like | SwipeAction::Superlike => {
                tx.delete_like(actor, target)?;
                tx.delete_match(MatchPair::new(actor, target))?;
                if action == SwipeAction::Superlike {
                    tx.refund_super_like(actor, now)?;
                }
                if !is_plus {
                    tx.refund_like(actor, swipe_day, now)?;
                }
            }
            SwipeAction::Dislike => {
                tx.undo_dislike(actor, target, now)?;
            }
        }

        tx.delete_swipe(swipe.id)?;
        Ok((swipe, used))
    })?;

    tracing::info!(
        actor_id = %actor,
        target_id = %swipe.target_user_id,
        action = %swipe.action,
        "swipe rewound"
    );

    Ok(RewindResponse {
        ok: true,
        undone_action: swipe.action,
        undone_target_id: swipe.target_user_id,
        rewinds_left: (limit - used).max(0),
    })
}
