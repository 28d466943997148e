use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use amora_shared::errors::{AppError, AppResult};
use amora_shared::types::auth::{AuthUser, UserRole};
use amora_shared::types::OkResponse;

use crate::models::Profile;
use crate::services::entitlements::EntitlementView;
use crate::services::moderation::{self, ModerationStatusView};
use crate::services::profile::{self, LocationRequest, ProfileCard, ProfileCoreRequest};
use crate::services::feed;
use crate::store::{EntitlementStore, ProfileStore, UserStore};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user_id: i64,
    pub username: Option<String>,
    pub role: UserRole,
    pub profile_completed: bool,
    pub profile: Option<Profile>,
    pub moderation: ModerationStatusView,
    pub entitlements: EntitlementView,
}

pub async fn me(State(state): State<Arc<AppState>>, user: AuthUser) -> AppResult<Json<MeResponse>> {
    let now = Utc::now();
    let mut conn = state.conn()?;

    let account = conn
        .find_user(user.id)?
        .ok_or_else(|| AppError::not_found("user not found"))?;
    let profile = conn.find_profile(user.id)?;
    let moderation = moderation::status_for_user(&mut *conn, user.id, now)?;
    let entitlement = conn.entitlement(user.id)?;

    Ok(Json(MeResponse {
        user_id: account.id,
        username: account.username,
        role: user.role,
        profile_completed: profile.as_ref().is_some_and(|p| p.profile_completed),
        profile,
        moderation,
        entitlements: EntitlementView::new(entitlement.as_ref(), now),
    }))
}

pub async fn submit_profile(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<ProfileCoreRequest>,
) -> AppResult<Json<Profile>> {
    let mut conn = state.conn()?;
    let saved = profile::submit_profile_core(&mut *conn, user.id, req, Utc::now())?;
    Ok(Json(saved))
}

pub async fn save_location(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<LocationRequest>,
) -> AppResult<Json<OkResponse>> {
    let best_effort = state.config.degraded.location_best_effort;
    let mut conn = match state.conn() {
        Ok(conn) => conn,
        Err(e) if best_effort => {
            tracing::warn!(user_id = %user.id, error = %e, "no database for location write, continuing");
            return Ok(Json(OkResponse::ok()));
        }
        Err(e) => return Err(e),
    };

    profile::save_location(&mut *conn, user.id, req, best_effort, Utc::now())?;
    Ok(Json(OkResponse::ok()))
}

/// A single candidate card, subject to the same visibility rules as the feed.
pub async fn candidate(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(candidate_id): Path<i64>,
) -> AppResult<Json<ProfileCard>> {
    let mut conn = state.conn()?;
    let card = feed::candidate_card(&mut *conn, user.id, candidate_id, Utc::now())?;
    Ok(Json(card))
}
