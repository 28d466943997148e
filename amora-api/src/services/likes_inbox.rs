use chrono::{DateTime, Utc};
use serde::Serialize;

use amora_shared::errors::{AppError, AppResult, ErrorCode};

use crate::services::profile::ProfileCard;
use crate::services::quota;
use crate::store::{EntitlementStore, LikesInboxStore, ProfileStore, Transactional};

const PREVIEW_LEN: i64 = 3;
const PLUS_PROFILES: i64 = 100;

#[derive(Debug, Clone, Serialize)]
pub struct IncomingPreview {
    pub from_user_id: i64,
    pub liked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IncomingLikes {
    pub count: i64,
    pub blurred: bool,
    pub preview: Vec<IncomingPreview>,
    pub profiles: Vec<ProfileCard>,
}

pub fn incoming<C>(conn: &mut C, user_id: i64, now: DateTime<Utc>) -> AppResult<IncomingLikes>
where
    C: LikesInboxStore + EntitlementStore,
{
    let count = conn.count_incoming(user_id)?;
    let preview = conn
        .incoming_likes(user_id, PREVIEW_LEN)?
        .into_iter()
        .map(|l| IncomingPreview {
            from_user_id: l.from_user_id,
            liked_at: l.liked_at,
        })
        .collect();

    let is_plus = quota::is_plus(conn, user_id, now)?;
    let profiles = if is_plus {
        conn.incoming_profiles(user_id, PLUS_PROFILES)?
            .iter()
            .map(|p| ProfileCard::from_profile(p, now))
            .collect()
    } else {
        Vec::new()
    };

    Ok(IncomingLikes {
        count,
        blurred: !is_plus,
        preview,
        profiles,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct RevealedLike {
    pub from_user_id: i64,
    pub liked_at: DateTime<Utc>,
    pub is_super_like: bool,
    pub profile: Option<ProfileCard>,
}

/// Spends one reveal credit on the newest liker not yet revealed.
pub fn reveal_one<C>(conn: &mut C, user_id: i64, now: DateTime<Utc>) -> AppResult<RevealedLike>
where
    C: LikesInboxStore + EntitlementStore + ProfileStore + Transactional,
{
    let like = conn.in_transaction(|tx| {
        let like = tx
            .latest_unrevealed(user_id)?
            .ok_or_else(|| AppError::new(ErrorCode::NothingToReveal, "no likes left to reveal"))?;
        if !tx.consume_reveal_credit(user_id, now)? {
            return Err(AppError::new(ErrorCode::RevealCreditRequired, "a reveal credit is required"));
        }
        tx.mark_revealed(user_id, like.from_user_id, now)?;
        Ok(like)
    })?;

    tracing::info!(user_id = %user_id, liker_id = %like.from_user_id, "incoming like revealed");

    let profile = conn
        .find_profile(like.from_user_id)?
        .map(|p| ProfileCard::from_profile(&p, now));
    Ok(RevealedLike {
        from_user_id: like.from_user_id,
        liked_at: like.liked_at,
        is_super_like: like.is_super_like,
        profile,
    })
}
