//! Telegram WebApp login: `initData` verification and the user/session
//! bootstrap that follows it.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use amora_shared::errors::{AppError, AppResult};
use amora_shared::types::auth::{TokenPair, UserRole};

use crate::kv::SessionStore;
use crate::services::moderation;
use crate::services::session::{self, SessionKeys};
use crate::store::{ProfileStore, UserStore};

type HmacSha256 = Hmac<Sha256>;

const SECRET_KEY_SALT: &[u8] = b"WebAppData";

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub language_code: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InitData {
    pub user: TelegramUser,
    pub auth_date: i64,
    pub query_id: Option<String>,
}

/// `key=value` pairs without `hash`, sorted by key, joined by newlines.
pub fn data_check_string(pairs: &[(String, String)]) -> String {
    let mut fields: Vec<&(String, String)> = pairs.iter().filter(|(k, _)| k != "hash").collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));
    fields
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn mac(key: &[u8]) -> AppResult<HmacSha256> {
    HmacSha256::new_from_slice(key).map_err(|e| AppError::internal(format!("hmac key rejected: {e}")))
}

/// MAC keyed with the per-bot secret, HMAC("WebAppData", bot_token).
fn bot_signer(bot_token: &str) -> AppResult<HmacSha256> {
    let mut secret = mac(SECRET_KEY_SALT)?;
    secret.update(bot_token.as_bytes());
    mac(&secret.finalize().into_bytes())
}

/// Hex signature Telegram would attach to `check_string` for this bot.
pub fn sign(bot_token: &str, check_string: &str) -> AppResult<String> {
    let mut signer = bot_signer(bot_token)?;
    signer.update(check_string.as_bytes());
    Ok(hex::encode(signer.finalize().into_bytes()))
}

pub fn verify_init_data(raw: &str, bot_token: &str, max_age_secs: i64, now: DateTime<Utc>) -> AppResult<InitData> {
    if bot_token.is_empty() {
        return Err(AppError::unauthorized("telegram login is not configured"));
    }

    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(raw.trim())
        .map_err(|_| AppError::unauthorized("malformed init data"))?;
    let field = |name: &str| pairs.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str());

    let hash = field("hash").ok_or_else(|| AppError::unauthorized("init data is not signed"))?;
    let provided = hex::decode(hash).map_err(|_| AppError::unauthorized("init data signature is invalid"))?;

    let mut signer = bot_signer(bot_token)?;
    signer.update(data_check_string(&pairs).as_bytes());
    signer
        .verify_slice(&provided)
        .map_err(|_| AppError::unauthorized("init data signature is invalid"))?;

    let auth_date: i64 = field("auth_date")
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| AppError::unauthorized("init data has no auth_date"))?;
    if now.timestamp() - auth_date > max_age_secs {
        return Err(AppError::unauthorized("init data has expired"));
    }

    let user: TelegramUser = field("user")
        .ok_or_else(|| AppError::unauthorized("init data has no user"))
        .and_then(|raw| {
            serde_json::from_str(raw).map_err(|_| AppError::unauthorized("init data user is malformed"))
        })?;

    Ok(InitData {
        user,
        auth_date,
        query_id: field("query_id").map(str::to_string),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct Me {
    pub user_id: i64,
    pub username: Option<String>,
    pub role: UserRole,
    pub profile_completed: bool,
    pub moderation_status: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub me: Me,
}

pub struct TelegramLogin<'a> {
    pub bot_token: &'a str,
    pub max_age_secs: i64,
    pub keys: SessionKeys<'a>,
}

pub async fn login<C, K>(
    conn: &mut C,
    kv: &K,
    settings: &TelegramLogin<'_>,
    init_data: &str,
    device_id: &str,
    now: DateTime<Utc>,
) -> AppResult<LoginResponse>
where
    C: UserStore + ProfileStore + Send,
    K: SessionStore + ?Sized,
{
    let data = verify_init_data(init_data, settings.bot_token, settings.max_age_secs, now)?;
    let username = data.user.username.as_deref().map(str::trim).filter(|u| !u.is_empty());

    let user = conn.upsert_telegram_user(data.user.id, username, now)?;
    let role = user.role.parse::<UserRole>().unwrap_or(UserRole::User);
    let profile = conn.find_profile(user.id)?;

    let tokens = session::login(kv, &settings.keys, user.id, role, device_id, now).await?;
    tracing::info!(user_id = %user.id, telegram_id = %data.user.id, "telegram login");

    Ok(LoginResponse {
        tokens,
        me: Me {
            user_id: user.id,
            username: user.username,
            role,
            profile_completed: profile.as_ref().is_some_and(|p| p.profile_completed),
            moderation_status: profile
                .map(|p| p.moderation_status)
                .unwrap_or_else(|| moderation::NO_STATUS.to_string()),
        },
    })
}
