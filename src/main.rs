use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sensor_telemetry_service::{
    api::{self, AppState},
    cache::MemoryCache,
    clock::SystemClock,
    config::Config,
    db,
    query::QuerySettings,
    store::{MemoryReadingStore, PgReadingStore, ReadingStore, StoreBackend},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env (ignore error if file absent; env vars may be set externally)
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;

    let store: Arc<dyn ReadingStore> = match config.store_backend {
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for the postgres backend")?;
            let pool =
                db::create_pool(url, config.database_max_connections, config.store_timeout).await?;
            db::run_migrations(&pool).await?;
            info!("Database ready");
            Arc::new(PgReadingStore::new(pool))
        }
        StoreBackend::Memory => {
            info!("Using in-memory reading store; data is lost on exit");
            Arc::new(MemoryReadingStore::new())
        }
    };

    let settings = QuerySettings {
        default_device_id: config.default_device_id.clone(),
        recent_window: chrono::Duration::minutes(config.recent_window_minutes),
        store_timeout: config.store_timeout,
        cache_timeout: config.cache_timeout,
    };
    let state = AppState::new(
        store,
        Arc::new(MemoryCache::with_capacity(config.cache_capacity)),
        Arc::new(SystemClock),
        config.invalidation_policy,
        settings,
    );
    info!(
        backend = %config.store_backend,
        policy = %config.invalidation_policy,
        cache_capacity = config.cache_capacity.get(),
        default_device_id = %config.default_device_id,
        "Services ready"
    );

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received");
}
