use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use amora_shared::errors::{AppError, AppResult, ErrorCode};
use amora_shared::types::auth::AuthUser;

use crate::middleware::BotCaller;
use crate::models::ModerationItem;
use crate::services::moderation::{self, ModerationStatusView, QueueEntry};
use crate::services::risk;
use crate::store::Decision;
use crate::AppState;

pub async fn status(State(state): State<Arc<AppState>>, user: AuthUser) -> AppResult<Json<ModerationStatusView>> {
    let mut conn = state.conn()?;
    let view = moderation::status_for_user(&mut *conn, user.id, Utc::now())?;
    Ok(Json(view))
}

// --- Bot surface ---

#[derive(Debug, Deserialize)]
pub struct ActorRequest {
    pub actor_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub actor_id: i64,
    pub reason_code: String,
    pub reason_text: String,
    pub required_fix_step: String,
}

fn actor(actor_id: i64) -> AppResult<i64> {
    if actor_id <= 0 {
        return Err(AppError::validation("actor_id is required"));
    }
    Ok(actor_id)
}

/// 204 when nothing is waiting.
pub async fn acquire(
    State(state): State<Arc<AppState>>,
    _bot: BotCaller,
    Json(req): Json<ActorRequest>,
) -> AppResult<Response> {
    let actor = actor(req.actor_id)?;
    let mut conn = state.conn()?;
    let lease = state.config.moderation.lease;

    match moderation::acquire_next(&mut *conn, actor, lease, Utc::now())? {
        Some(entry) => Ok(Json(entry).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

pub async fn item(
    State(state): State<Arc<AppState>>,
    _bot: BotCaller,
    Path(item_id): Path<i64>,
) -> AppResult<Json<QueueEntry>> {
    let mut conn = state.conn()?;
    let entry = moderation::item_snapshot(&mut *conn, item_id)?;
    Ok(Json(entry))
}

pub async fn approve(
    State(state): State<Arc<AppState>>,
    _bot: BotCaller,
    Path(item_id): Path<i64>,
    Json(req): Json<ActorRequest>,
) -> AppResult<Json<ModerationItem>> {
    let actor = actor(req.actor_id)?;
    let mut conn = state.conn()?;
    let item = moderation::decide(
        &mut *conn,
        state.events.as_ref(),
        actor,
        item_id,
        Decision::Approve,
        Utc::now(),
    )
    .await?;
    Ok(Json(item))
}

pub async fn reject(
    State(state): State<Arc<AppState>>,
    _bot: BotCaller,
    Path(item_id): Path<i64>,
    Json(req): Json<RejectRequest>,
) -> AppResult<Json<ModerationItem>> {
    let actor = actor(req.actor_id)?;
    let decision = moderation::rejection(
        &req.reason_code,
        &req.reason_text,
        &req.required_fix_step,
        &state.config.moderation.reject_reasons,
    )?;

    let mut conn = state.conn()?;
    let item = moderation::decide(&mut *conn, state.events.as_ref(), actor, item_id, decision, Utc::now()).await?;
    Ok(Json(item))
}

#[derive(Debug, Serialize)]
pub struct ReleaseResponse {
    pub ok: bool,
    pub released: bool,
}

pub async fn release(
    State(state): State<Arc<AppState>>,
    _bot: BotCaller,
    Path(item_id): Path<i64>,
    Json(req): Json<ActorRequest>,
) -> AppResult<Json<ReleaseResponse>> {
    let actor = actor(req.actor_id)?;
    let mut conn = state.conn()?;
    let released = moderation::release(&mut *conn, actor, item_id, Utc::now())?;
    Ok(Json(ReleaseResponse { ok: true, released }))
}

#[derive(Debug, Serialize)]
pub struct AntiAbuseStats {
    pub key: String,
    pub counters: HashMap<String, i64>,
}

pub async fn antiabuse_stats(State(state): State<Arc<AppState>>, _bot: BotCaller) -> AppResult<Json<AntiAbuseStats>> {
    let now = Utc::now();
    let counters = risk::dashboard(state.kv.as_ref(), now).await?;
    Ok(Json(AntiAbuseStats { key: risk::dashboard_key(now), counters }))
}

pub async fn not_implemented() -> AppError {
    AppError::new(ErrorCode::NotImplemented, "not implemented")
}
