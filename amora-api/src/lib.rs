use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use amora_shared::clients::db::{DbConn, DbPool};
use amora_shared::clients::redis::RedisClient;
use amora_shared::errors::{AppError, AppResult};

pub mod config;
pub mod events;
pub mod kv;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod schema;
pub mod services;
pub mod store;
pub mod tasks;

#[cfg(test)]
mod testing;

use config::AppConfig;
use events::EventSink;
use kv::KvStore;

pub const SERVICE_NAME: &str = events::SERVICE_NAME;

pub struct AppState {
    /// `None` while running degraded without a database.
    pub db: Option<DbPool>,
    pub kv: Arc<dyn KvStore>,
    /// Kept for health probes; `kv` wraps the same connection.
    pub redis: RedisClient,
    pub events: Arc<dyn EventSink>,
    pub config: AppConfig,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    /// A pooled connection, or `TEMP_UNAVAILABLE` when the database is down or absent.
    pub fn conn(&self) -> AppResult<DbConn> {
        let pool = self
            .db
            .as_ref()
            .ok_or_else(|| AppError::temp_unavailable("database unavailable"))?;
        Ok(pool.get()?)
    }
}
