use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use amora_shared::errors::AppResult;
use amora_shared::middleware::DeviceId;
use amora_shared::types::auth::{AuthUser, TokenPair};
use amora_shared::types::OkResponse;

use crate::services::session::{self, SessionKeys};
use crate::services::telegram::{self, LoginResponse, TelegramLogin};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct TelegramAuthRequest {
    pub init_data: String,
}

pub async fn telegram_login(
    State(state): State<Arc<AppState>>,
    DeviceId(device_id): DeviceId,
    Json(req): Json<TelegramAuthRequest>,
) -> AppResult<Json<LoginResponse>> {
    let cfg = &state.config;
    let settings = TelegramLogin {
        bot_token: &cfg.bot_token,
        max_age_secs: cfg.auth.init_data_max_age,
        keys: SessionKeys::from_config(cfg),
    };

    let mut conn = state.conn()?;
    let resp = telegram::login(&mut *conn, state.kv.as_ref(), &settings, &req.init_data, &device_id, Utc::now()).await?;
    Ok(Json(resp))
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshRequest>,
) -> AppResult<Json<TokenPair>> {
    let keys = SessionKeys::from_config(&state.config);
    let pair = session::refresh(state.kv.as_ref(), &keys, req.refresh_token.trim(), Utc::now()).await?;
    Ok(Json(pair))
}

pub async fn logout(State(state): State<Arc<AppState>>, user: AuthUser) -> AppResult<Json<OkResponse>> {
    session::logout(state.kv.as_ref(), &user).await?;
    Ok(Json(OkResponse::ok()))
}

#[derive(Debug, Serialize)]
pub struct LogoutAllResponse {
    pub ok: bool,
    pub revoked: usize,
}

pub async fn logout_all(State(state): State<Arc<AppState>>, user: AuthUser) -> AppResult<Json<LogoutAllResponse>> {
    let revoked = session::logout_all(state.kv.as_ref(), user.id).await?;
    Ok(Json(LogoutAllResponse { ok: true, revoked }))
}
