use std::sync::Arc;

use axum::body::Body;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::Response;
use subtle::ConstantTimeEq;

use amora_shared::errors::{AppError, AppResult};
use amora_shared::middleware::{decode_access_token, extract_bearer_token};
use amora_shared::types::auth::AuthUser;

use crate::services::session;
use crate::AppState;

pub const BOT_TOKEN_HEADER: &str = "X-Bot-Token";

async fn session_user(state: &AppState, headers: &HeaderMap) -> AppResult<AuthUser> {
    let token = extract_bearer_token(headers)?;
    let claims = decode_access_token(&token, &state.config.jwt_secret)?;
    session::authenticate(state.kv.as_ref(), claims).await
}

/// Bearer token whose session is still live; the caller lands in the
/// request extensions for the `AuthUser` extractor.
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> AppResult<Response> {
    let user = session_user(&state, req.headers()).await?;
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Like `require_session`, but requests without a usable token pass through anonymous.
pub async fn optional_session(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if req.headers().contains_key(axum::http::header::AUTHORIZATION) {
        match session_user(&state, req.headers()).await {
            Ok(user) => {
                req.extensions_mut().insert(user);
            }
            Err(e) => tracing::debug!(error = %e, "ignoring unusable bearer token"),
        }
    }
    next.run(req).await
}

/// The moderation bot, identified by `X-Bot-Token`.
#[derive(Debug, Clone, Copy)]
pub struct BotCaller;

pub fn bot_token_matches(expected: &str, presented: &str) -> bool {
    !expected.is_empty() && bool::from(expected.as_bytes().ct_eq(presented.as_bytes()))
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for BotCaller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let presented = parts
            .headers
            .get(BOT_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        if !bot_token_matches(&state.config.bot_token, presented) {
            return Err(AppError::unauthorized("invalid bot token"));
        }
        Ok(Self)
    }
}
