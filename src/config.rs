use std::{num::NonZeroUsize, time::Duration};

use anyhow::{Context, Result};

use crate::{cache::InvalidationPolicy, db::models::DEFAULT_DEVICE_ID, store::StoreBackend};

#[derive(Debug, Clone)]
pub struct Config {
    pub store_backend: StoreBackend,
    /// Required when `store_backend` is Postgres.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub server_host: String,
    pub server_port: u16,
    /// Device served when a request does not name one.
    pub default_device_id: String,
    pub store_timeout: Duration,
    pub cache_timeout: Duration,
    /// `get_latest` looks this far back before falling back to any row.
    pub recent_window_minutes: i64,
    pub invalidation_policy: InvalidationPolicy,
    /// Maximum number of cached responses.
    pub cache_capacity: NonZeroUsize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let store_backend: StoreBackend = optional("STORE_BACKEND", "postgres")
            .parse()
            .context("STORE_BACKEND must be 'postgres' or 'memory'")?;

        let database_url = match store_backend {
            StoreBackend::Postgres => Some(required("DATABASE_URL")?),
            StoreBackend::Memory => std::env::var("DATABASE_URL").ok(),
        };

        Ok(Self {
            store_backend,
            database_url,
            database_max_connections: optional("DATABASE_MAX_CONNECTIONS", "10")
                .parse()
                .context("DATABASE_MAX_CONNECTIONS must be a positive integer")?,
            server_host: optional("SERVER_HOST", "0.0.0.0"),
            server_port: optional("SERVER_PORT", "8080")
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
            default_device_id: optional("DEFAULT_DEVICE_ID", DEFAULT_DEVICE_ID),
            store_timeout: millis("STORE_TIMEOUT_MS", "5000")?,
            cache_timeout: millis("CACHE_TIMEOUT_MS", "500")?,
            recent_window_minutes: optional("RECENT_WINDOW_MINUTES", "10")
                .parse()
                .context("RECENT_WINDOW_MINUTES must be an integer")?,
            invalidation_policy: optional("CACHE_INVALIDATION_POLICY", "ttl")
                .parse()
                .context("CACHE_INVALIDATION_POLICY must be 'ttl' or 'evict_on_write'")?,
            cache_capacity: optional("CACHE_CAPACITY", "1024")
                .parse()
                .context("CACHE_CAPACITY must be a positive integer")?,
        })
    }
}

fn millis(key: &str, default: &str) -> Result<Duration> {
    let ms: u64 = optional(key, default)
        .parse()
        .with_context(|| format!("{key} must be a number of milliseconds"))?;
    Ok(Duration::from_millis(ms))
}

fn required(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("missing required env var: {key}"))
}

fn optional(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}
