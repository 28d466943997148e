use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;

use amora_shared::errors::AppResult;
use amora_shared::middleware::ClientTimezone;
use amora_shared::types::auth::AuthUser;

use crate::services::feed::{self, FeedPage, FeedParams, FeedSettings};
use crate::services::quota::{self, QuotaSnapshot};
use crate::services::rewind::{self, RewindResponse};
use crate::services::swipe::{self, SwipeRequest, SwipeResponse, SwipeSettings};
use crate::AppState;

pub async fn feed_page(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(params): Query<FeedParams>,
) -> AppResult<Json<FeedPage>> {
    let cfg = &state.config;
    let settings = FeedSettings {
        feed: &cfg.feed,
        ads: &cfg.ads,
        antiabuse: &cfg.antiabuse,
    };

    let mut conn = state.conn()?;
    let page = feed::feed_page(&mut *conn, state.kv.as_ref(), user.id, &params, settings, Utc::now()).await?;
    Ok(Json(page))
}

pub async fn swipe(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ClientTimezone(tz): ClientTimezone,
    Json(req): Json<SwipeRequest>,
) -> AppResult<Json<SwipeResponse>> {
    let cfg = &state.config;
    let settings = SwipeSettings {
        limits: &cfg.limits,
        antiabuse: &cfg.antiabuse,
    };

    let mut conn = state.conn()?;
    let resp = swipe::swipe(
        &mut *conn,
        state.kv.as_ref(),
        state.events.as_ref(),
        settings,
        user.id,
        &req,
        tz.as_deref(),
        Utc::now(),
    )
    .await?;
    Ok(Json(resp))
}

pub async fn rewind(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ClientTimezone(tz): ClientTimezone,
) -> AppResult<Json<RewindResponse>> {
    let mut conn = state.conn()?;
    let resp = rewind::rewind(&mut *conn, user.id, tz.as_deref(), &state.config.limits, Utc::now())?;
    Ok(Json(resp))
}

pub async fn quota(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ClientTimezone(tz): ClientTimezone,
) -> AppResult<Json<QuotaSnapshot>> {
    let mut conn = state.conn()?;
    let snapshot = quota::snapshot(&mut *conn, user.id, tz.as_deref(), &state.config.limits, Utc::now())?;
    Ok(Json(snapshot))
}
