pub mod dto;
pub mod errors;
pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use handlers::ApiDoc;

use crate::{
    cache::{CacheStore, FreshnessInvalidator, InvalidationPolicy},
    clock::Clock,
    ingest::IngestService,
    query::{QuerySettings, SensorQueryService},
    store::ReadingStore,
};

/// Shared handler state. Both services see the same store, cache and
/// invalidator, so a write is visible to the next read.
#[derive(Clone)]
pub struct AppState {
    pub query: SensorQueryService,
    pub ingest: IngestService,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ReadingStore>,
        cache: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        policy: InvalidationPolicy,
        settings: QuerySettings,
    ) -> Self {
        let invalidator = FreshnessInvalidator::new(cache.clone(), policy, settings.cache_timeout);
        let ingest = IngestService::new(
            store.clone(),
            invalidator.clone(),
            clock.clone(),
            settings.store_timeout,
        );
        let query = SensorQueryService::new(store, cache, invalidator, clock, settings);
        Self { query, ingest }
    }
}

pub fn router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .route("/sensor-data/realtime", get(handlers::get_realtime))
        .route("/sensor-data/historical", get(handlers::get_historical))
        .route("/sensor-data/logs", get(handlers::get_logs))
        .route("/sensor-data/{channel}", get(handlers::get_channel_series))
        .route("/sensor-data", post(handlers::post_sensor_data))
        .route("/webhook/antares", post(handlers::antares_webhook))
        .route("/system/status", get(handlers::get_system_status))
        .with_state(state)
        .split_for_parts();

    router
        .route("/health", get(handlers::health))
        .route(
            "/api-docs/openapi.json",
            get(move || async move { axum::Json(api) }),
        )
}
