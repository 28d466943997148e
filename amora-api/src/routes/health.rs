use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use amora_shared::types::{HealthCheck, HealthResponse, HealthStatus};

use crate::{AppState, SERVICE_NAME};

/// Liveness plus a probe of each backing store. A missing database pool
/// reports `degraded`; an unreachable Redis reports `unhealthy`.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    let postgres = match &state.db {
        None => HealthCheck::new("postgres", HealthStatus::Degraded, Some("not connected".into())),
        Some(pool) => match pool.get() {
            Ok(_) => HealthCheck::new("postgres", HealthStatus::Healthy, None),
            Err(e) => HealthCheck::new("postgres", HealthStatus::Degraded, Some(e.to_string())),
        },
    };

    let redis = match state.redis.ping().await {
        Ok(()) => HealthCheck::new("redis", HealthStatus::Healthy, None),
        Err(e) => HealthCheck::new("redis", HealthStatus::Unhealthy, Some(e.to_string())),
    };

    let response = HealthResponse::healthy(SERVICE_NAME, env!("CARGO_PKG_VERSION")).with_checks(vec![postgres, redis]);
    let status = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, Json(response)).into_response()
}

/// Prometheus exposition; empty when no recorder was installed.
pub async fn metrics(State(state): State<Arc<AppState>>) -> String {
    state
        .metrics_handle
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default()
}
