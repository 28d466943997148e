use std::sync::Arc;
use std::time::Duration;

use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::timeout::{RequestBodyTimeoutLayer, TimeoutLayer};
use tower_http::trace::TraceLayer;

use amora_shared::middleware::metrics_middleware;

use crate::middleware::{optional_session, require_session};
use crate::AppState;

pub mod auth;
pub mod feed;
pub mod health;
pub mod moderation;
pub mod payments;
pub mod profile;
pub mod social;
pub mod telemetry;

pub fn router(state: Arc<AppState>) -> Router {
    let public = Router::new()
        .route("/healthz", get(health::health_check))
        .route("/metrics", get(health::metrics))
        .route("/v1/auth/telegram", post(auth::telegram_login))
        .route("/v1/auth/refresh", post(auth::refresh))
        .route("/v1/purchase/catalogue", get(payments::catalogue))
        .route("/purchase/webhook", post(payments::webhook));

    let authed = Router::new()
        .route("/v1/auth/logout", post(auth::logout))
        .route("/v1/auth/logout_all", post(auth::logout_all))
        .route("/v1/me", get(profile::me))
        .route("/v1/profile", put(profile::submit_profile))
        .route("/v1/profile/location", post(profile::save_location))
        .route("/v1/profiles/:id", get(profile::candidate))
        .route("/v1/feed", get(feed::feed_page))
        .route("/v1/swipes", post(feed::swipe))
        .route("/v1/swipe", post(feed::swipe))
        .route("/v1/rewind", post(feed::rewind))
        .route("/v1/quota", get(feed::quota))
        .route("/v1/likes/incoming", get(social::incoming_likes))
        .route("/v1/likes/reveal_one", post(social::reveal_one))
        .route("/v1/matches", get(social::list_matches))
        .route("/v1/unmatch", post(social::unmatch))
        .route("/v1/block", post(social::block))
        .route("/v1/report", post(social::report))
        .route("/v1/moderation/status", get(moderation::status))
        .route("/v1/purchase/begin", post(payments::begin))
        .route("/pay/dev/grant", post(payments::dev_grant))
        .route_layer(from_fn_with_state(state.clone(), require_session));

    let optional = Router::new()
        .route("/events/batch", post(telemetry::batch))
        .route_layer(from_fn_with_state(state.clone(), optional_session));

    let bot = Router::new()
        .route("/mod/queue/acquire", post(moderation::acquire))
        .route("/mod/items/:id", get(moderation::item))
        .route("/mod/items/:id/approve", post(moderation::approve))
        .route("/mod/items/:id/reject", post(moderation::reject))
        .route("/mod/items/:id/release", post(moderation::release))
        .route("/antiabuse/stats", get(moderation::antiabuse_stats))
        .fallback(moderation::not_implemented);

    let timeout = Duration::from_secs(state.config.http_write_timeout.max(1) as u64);
    let body_timeout = Duration::from_secs(state.config.http_read_timeout.max(1) as u64);

    Router::new()
        .merge(public)
        .merge(authed)
        .merge(optional)
        .nest("/admin/bot", bot)
        .layer(from_fn(metrics_middleware))
        .layer(TimeoutLayer::new(timeout))
        .layer(RequestBodyTimeoutLayer::new(body_timeout))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
