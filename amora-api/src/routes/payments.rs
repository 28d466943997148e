use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;

use amora_shared::errors::{AppError, AppResult};
use amora_shared::types::auth::AuthUser;

use crate::services::entitlements::{self, CatalogueEntry};
use crate::services::payments::{self, BeginRequest, DevGrantRequest, PurchaseView, WebhookPayload, WebhookResponse};
use crate::AppState;

pub const PROVIDER_HEADER: &str = "X-Provider";
pub const SIGNATURE_HEADER: &str = "X-Signature";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

pub async fn catalogue(State(state): State<Arc<AppState>>) -> Json<Vec<CatalogueEntry>> {
    Json(entitlements::catalogue(&state.config.payments.currency))
}

pub async fn begin(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<BeginRequest>,
) -> AppResult<Json<PurchaseView>> {
    let mut conn = state.conn()?;
    let view = payments::begin(&mut *conn, &state.config.payments, user.id, &req, Utc::now())?;
    Ok(Json(view))
}

/// The signature covers the raw body, so it is checked before parsing.
pub async fn webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<WebhookResponse>> {
    let cfg = &state.config.payments;
    let signature = header(&headers, SIGNATURE_HEADER).unwrap_or_default();
    payments::verify_signature(&cfg.webhook_secret, &body, signature)?;

    let provider = header(&headers, PROVIDER_HEADER).unwrap_or(cfg.default_provider.as_str());
    let raw: serde_json::Value =
        serde_json::from_slice(&body).map_err(|e| AppError::validation(format!("invalid webhook body: {e}")))?;
    let payload: WebhookPayload =
        serde_json::from_value(raw.clone()).map_err(|e| AppError::validation(format!("invalid webhook body: {e}")))?;

    let mut conn = state.conn()?;
    let resp = payments::webhook(&mut *conn, state.events.as_ref(), provider, &payload, &raw, Utc::now()).await?;
    Ok(Json(resp))
}

pub async fn dev_grant(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<DevGrantRequest>,
) -> AppResult<Json<PurchaseView>> {
    let mut conn = state.conn()?;
    let view = payments::dev_grant(
        &mut *conn,
        state.events.as_ref(),
        &state.config.payments,
        &user,
        &req,
        Utc::now(),
    )
    .await?;
    Ok(Json(view))
}
