use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use validator::Validate;

use amora_shared::errors::{AppError, AppResult};
use amora_shared::types::auth::AuthUser;
use amora_shared::types::{OkResponse, Paginated, PaginationParams};

use crate::models::Report;
use crate::services::likes_inbox::{self, IncomingLikes, RevealedLike};
use crate::services::matchmaker::{self, MatchView};
use crate::services::safety::{self, BlockRequest, ReportRequest, TargetRequest};
use crate::AppState;

pub async fn incoming_likes(State(state): State<Arc<AppState>>, user: AuthUser) -> AppResult<Json<IncomingLikes>> {
    let mut conn = state.conn()?;
    let likes = likes_inbox::incoming(&mut *conn, user.id, Utc::now())?;
    Ok(Json(likes))
}

pub async fn reveal_one(State(state): State<Arc<AppState>>, user: AuthUser) -> AppResult<Json<RevealedLike>> {
    let mut conn = state.conn()?;
    let revealed = likes_inbox::reveal_one(&mut *conn, user.id, Utc::now())?;
    Ok(Json(revealed))
}

pub async fn list_matches(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<Paginated<MatchView>>> {
    let mut conn = state.conn()?;
    let page = matchmaker::list_matches(&mut *conn, user.id, &params, Utc::now())?;
    Ok(Json(page))
}

#[derive(Debug, Serialize)]
pub struct UnmatchResponse {
    pub ok: bool,
    pub removed: bool,
}

pub async fn unmatch(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<TargetRequest>,
) -> AppResult<Json<UnmatchResponse>> {
    req.validate().map_err(|e| AppError::validation(e.to_string()))?;
    safety::check_target(user.id, req.target_id)?;

    let mut conn = state.conn()?;
    let removed = matchmaker::unmatch(&mut *conn, user.id, req.target_id, Utc::now())?;
    Ok(Json(UnmatchResponse { ok: true, removed }))
}

pub async fn block(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<BlockRequest>,
) -> AppResult<Json<OkResponse>> {
    let mut conn = state.conn()?;
    safety::block(&mut *conn, user.id, &req, Utc::now())?;
    Ok(Json(OkResponse::ok()))
}

pub async fn report(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<ReportRequest>,
) -> AppResult<Json<Report>> {
    let mut conn = state.conn()?;
    let report = safety::report(
        &mut *conn,
        state.kv.as_ref(),
        &state.config.antiabuse,
        user.id,
        &req,
        Utc::now(),
    )
    .await?;
    Ok(Json(report))
}
