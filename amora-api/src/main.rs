use std::sync::Arc;

use amora_api::config::AppConfig;
use amora_api::events::{EventSink, Telemetry};
use amora_api::{routes, tasks, AppState, SERVICE_NAME};
use amora_shared::clients::db::create_pool;
use amora_shared::clients::rabbitmq::RabbitMQClient;
use amora_shared::clients::redis::{redis_url, RedisClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    amora_shared::middleware::init_tracing(SERVICE_NAME);

    let config = AppConfig::load()?;

    let metrics_handle = match amora_shared::middleware::init_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "metrics recorder not installed");
            None
        }
    };

    // Without Postgres the process still serves health and session-only routes.
    let db = match create_pool(&config.postgres_dsn, config.postgres_pool_size) {
        Ok(pool) => Some(pool),
        Err(e) => {
            tracing::error!(error = %e, "database unavailable, starting degraded");
            None
        }
    };

    let redis = RedisClient::connect(&redis_url(
        &config.redis_addr,
        config.redis_db,
        config.redis_password.as_deref(),
    ))
    .await?;

    let rabbitmq = match config.rabbitmq_url.as_deref().filter(|u| !u.is_empty()) {
        Some(url) => match RabbitMQClient::connect(url).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "broker unavailable, telemetry is log-only");
                None
            }
        },
        None => None,
    };
    let events: Arc<dyn EventSink> = Arc::new(Telemetry::new(rabbitmq));

    let addr = config.http_addr.clone();
    let state = Arc::new(AppState {
        db,
        kv: Arc::new(redis.clone()),
        redis,
        events,
        config,
        metrics_handle,
    });

    let cleanup = tasks::cleanup::spawn_cleanup_task(state.clone());
    let app = routes::router(state);

    tracing::info!(addr = %addr, "{SERVICE_NAME} starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cleanup.abort();
    tracing::info!("{SERVICE_NAME} stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
