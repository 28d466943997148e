use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::errors::AppError;

pub const DEVICE_ID_HEADER: &str = "X-Device-Id";
pub const TIMEZONE_HEADER: &str = "X-Timezone";

/// `X-Device-Id`, required where a new session is minted.
#[derive(Debug, Clone)]
pub struct DeviceId(pub String);

#[axum::async_trait]
impl<S> FromRequestParts<S> for DeviceId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(DEVICE_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .unwrap_or_default();

        if value.is_empty() || value.len() > 128 {
            return Err(AppError::validation("X-Device-Id header is required"));
        }
        Ok(Self(value.to_string()))
    }
}

/// `X-Timezone` as sent by the client. Resolution to a zone happens later;
/// unknown names fall back to UTC there.
#[derive(Debug, Clone, Default)]
pub struct ClientTimezone(pub Option<String>);

#[axum::async_trait]
impl<S> FromRequestParts<S> for ClientTimezone
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let tz = parts
            .headers
            .get(TIMEZONE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        Ok(Self(tz))
    }
}
