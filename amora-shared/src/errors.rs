use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ApiErrorResponse;

/// Retry hint attached to `TEMP_UNAVAILABLE` when the caller has nothing better.
pub const DEFAULT_RETRY_AFTER_SECS: i64 = 10;

/// Error kinds surfaced to clients. The wire form is the UPPER_SNAKE name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    AgeRejected,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    SuperlikeRequirementsNotMet,
    NothingToRewind,
    NothingToReveal,
    RevealCreditRequired,
    LikeLimitReached,
    RewindLimitReached,
    TooFast,
    CooldownActive,
    PhotoLimitReached,
    TempUnavailable,
    InternalError,
    NotImplemented,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::AgeRejected => "AGE_REJECTED",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::SuperlikeRequirementsNotMet => "SUPERLIKE_REQUIREMENTS_NOT_MET",
            Self::NothingToRewind => "NOTHING_TO_REWIND",
            Self::NothingToReveal => "NOTHING_TO_REVEAL",
            Self::RevealCreditRequired => "REVEAL_CREDIT_REQUIRED",
            Self::LikeLimitReached => "LIKE_LIMIT_REACHED",
            Self::RewindLimitReached => "REWIND_LIMIT_REACHED",
            Self::TooFast => "TOO_FAST",
            Self::CooldownActive => "COOLDOWN_ACTIVE",
            Self::PhotoLimitReached => "PHOTO_LIMIT_REACHED",
            Self::TempUnavailable => "TEMP_UNAVAILABLE",
            Self::InternalError => "INTERNAL_ERROR",
            Self::NotImplemented => "NOT_IMPLEMENTED",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationError | Self::AgeRejected => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict
            | Self::SuperlikeRequirementsNotMet
            | Self::NothingToRewind
            | Self::NothingToReveal
            | Self::RevealCreditRequired
            | Self::PhotoLimitReached => StatusCode::CONFLICT,
            Self::LikeLimitReached
            | Self::RewindLimitReached
            | Self::TooFast
            | Self::CooldownActive => StatusCode::TOO_MANY_REQUESTS,
            Self::TempUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotImplemented => StatusCode::NOT_IMPLEMENTED,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Known {
        code: ErrorCode,
        message: String,
        retry_after_sec: Option<i64>,
        cooldown_until: Option<DateTime<Utc>>,
    },

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("key-value store error: {0}")]
    Kv(#[from] redis::RedisError),

    #[error("validation error: {0}")]
    Validation(String),
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Known {
            code,
            message: message.into(),
            retry_after_sec: None,
            cooldown_until: None,
        }
    }

    /// Rate and cooldown failures carry a retry hint and, when a cooldown is
    /// running, its end.
    pub fn throttled(
        code: ErrorCode,
        message: impl Into<String>,
        retry_after_sec: i64,
        cooldown_until: Option<DateTime<Utc>>,
    ) -> Self {
        Self::Known {
            code,
            message: message.into(),
            retry_after_sec: Some(retry_after_sec.max(1)),
            cooldown_until,
        }
    }

    pub fn temp_unavailable(message: impl Into<String>) -> Self {
        Self::Known {
            code: ErrorCode::TempUnavailable,
            message: message.into(),
            retry_after_sec: Some(DEFAULT_RETRY_AFTER_SECS),
            cooldown_until: None,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// The kind this error renders as.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            AppError::Known { code, .. } => *code,
            AppError::Internal(_) => ErrorCode::InternalError,
            AppError::Database(diesel::result::Error::NotFound) => ErrorCode::NotFound,
            AppError::Database(_) => ErrorCode::InternalError,
            AppError::Pool(_) | AppError::Kv(_) => ErrorCode::TempUnavailable,
            AppError::Validation(_) => ErrorCode::ValidationError,
        }
    }

    pub fn retry_after_sec(&self) -> Option<i64> {
        match self {
            AppError::Known { retry_after_sec, .. } => *retry_after_sec,
            AppError::Pool(_) | AppError::Kv(_) => Some(DEFAULT_RETRY_AFTER_SECS),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.error_code();
        let retry_after = self.retry_after_sec();

        let body = match &self {
            AppError::Known { message, retry_after_sec, cooldown_until, .. } => {
                let mut resp = ApiErrorResponse::new(code.code(), message);
                resp.retry_after_sec = *retry_after_sec;
                resp.cooldown_until = *cooldown_until;
                resp
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                ApiErrorResponse::new(code.code(), "internal server error")
            }
            AppError::Database(err) => {
                tracing::error!(error = %err, "database error");
                match err {
                    diesel::result::Error::NotFound => {
                        ApiErrorResponse::new(code.code(), "resource not found")
                    }
                    _ => ApiErrorResponse::new(code.code(), "database error"),
                }
            }
            AppError::Pool(err) => {
                tracing::error!(error = %err, "database pool unavailable");
                ApiErrorResponse::new(code.code(), "database temporarily unavailable")
                    .with_retry_after(DEFAULT_RETRY_AFTER_SECS)
            }
            AppError::Kv(err) => {
                tracing::error!(error = %err, "key-value store unavailable");
                ApiErrorResponse::new(code.code(), "service temporarily unavailable")
                    .with_retry_after(DEFAULT_RETRY_AFTER_SECS)
            }
            AppError::Validation(msg) => ApiErrorResponse::new(code.code(), msg),
        };

        let mut response = (code.status_code(), Json(body)).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

pub type AppResult<T> = Result<T, AppError>;
