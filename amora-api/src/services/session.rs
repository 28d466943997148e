use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use amora_shared::errors::{AppError, AppResult};
use amora_shared::middleware::encode_access_token;
use amora_shared::types::auth::{AuthUser, Claims, TokenPair, UserRole};

use crate::config::AppConfig;
use crate::kv::{SessionRecord, SessionStore};

/// Signing secret and lifetimes for one issued pair.
#[derive(Debug, Clone)]
pub struct SessionKeys<'a> {
    pub secret: &'a str,
    pub access_ttl: i64,
    pub refresh_ttl: i64,
}

impl<'a> SessionKeys<'a> {
    pub fn from_config(config: &'a AppConfig) -> Self {
        Self {
            secret: &config.jwt_secret,
            access_ttl: config.jwt_access_ttl,
            refresh_ttl: config.refresh_ttl,
        }
    }
}

pub fn create_refresh_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    hex::encode(bytes)
}

/// Refresh tokens only reach the K-V store hashed.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn access_token(keys: &SessionKeys<'_>, user_id: i64, sid: &str, role: UserRole) -> AppResult<String> {
    let claims = Claims::new(user_id, sid, role, keys.access_ttl);
    encode_access_token(&claims, keys.secret)
}

/// Mints a new session for `device_id` and returns its first token pair.
pub async fn login<K>(
    kv: &K,
    keys: &SessionKeys<'_>,
    user_id: i64,
    role: UserRole,
    device_id: &str,
    now: DateTime<Utc>,
) -> AppResult<TokenPair>
where
    K: SessionStore + ?Sized,
{
    let record = SessionRecord {
        sid: Uuid::new_v4().to_string(),
        user_id,
        role,
        device_id: device_id.to_string(),
        created_at: now,
        expires_at: now + Duration::seconds(keys.refresh_ttl),
    };
    let refresh = create_refresh_token();
    kv.create_session(&record, &hash_token(&refresh), keys.refresh_ttl).await?;

    tracing::info!(user_id = %user_id, sid = %record.sid, device_id = %device_id, "session created");

    let access = access_token(keys, user_id, &record.sid, role)?;
    Ok(TokenPair::new(access, refresh, keys.access_ttl))
}

/// Swaps `refresh_token` for a new pair. The old token stops working at once.
pub async fn refresh<K>(kv: &K, keys: &SessionKeys<'_>, refresh_token: &str, now: DateTime<Utc>) -> AppResult<TokenPair>
where
    K: SessionStore + ?Sized,
{
    let refresh_token = refresh_token.trim();
    if refresh_token.is_empty() {
        return Err(AppError::unauthorized("refresh token is required"));
    }

    let next = create_refresh_token();
    let sid = kv
        .rotate_refresh(&hash_token(refresh_token), &hash_token(&next), keys.refresh_ttl)
        .await?
        .ok_or_else(|| AppError::unauthorized("invalid refresh token"))?;

    let mut record = kv
        .find_session(&sid)
        .await?
        .ok_or_else(|| AppError::unauthorized("session expired"))?;
    record.expires_at = now + Duration::seconds(keys.refresh_ttl);
    kv.save_session(&record, keys.refresh_ttl).await?;

    tracing::debug!(user_id = %record.user_id, sid = %sid, "refresh token rotated");

    let access = access_token(keys, record.user_id, &sid, record.role)?;
    Ok(TokenPair::new(access, next, keys.access_ttl))
}

pub async fn logout<K: SessionStore + ?Sized>(kv: &K, user: &AuthUser) -> AppResult<()> {
    kv.delete_session(&user.session_id, user.id).await?;
    tracing::info!(user_id = %user.id, sid = %user.session_id, "session closed");
    Ok(())
}

/// Closes every session of the user; returns how many were open.
pub async fn logout_all<K: SessionStore + ?Sized>(kv: &K, user_id: i64) -> AppResult<usize> {
    let sids = kv.user_sessions(user_id).await?;
    for sid in &sids {
        kv.delete_session(sid, user_id).await?;
    }
    tracing::info!(user_id = %user_id, sessions = sids.len(), "all sessions closed");
    Ok(sids.len())
}

/// Resolves verified claims to a caller, provided the session still exists.
/// The role comes from the session so a stale token cannot keep old privileges.
pub async fn authenticate<K: SessionStore + ?Sized>(kv: &K, claims: Claims) -> AppResult<AuthUser> {
    let record = kv
        .find_session(&claims.sid)
        .await?
        .ok_or_else(|| AppError::unauthorized("session expired"))?;
    if record.user_id != claims.sub {
        return Err(AppError::unauthorized("session does not belong to token"));
    }
    Ok(AuthUser {
        id: record.user_id,
        session_id: record.sid,
        role: record.role,
    })
}
