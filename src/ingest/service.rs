use std::{sync::Arc, time::Duration};

use serde_json::Value;
use tracing::info;

use super::payload::IngestPayload;
use crate::{
    cache::FreshnessInvalidator,
    clock::Clock,
    db::models::Reading,
    error::{store_deadline, IngestError},
    store::ReadingStore,
};

/// Write path: persist one reading, then evict whatever it made stale.
#[derive(Clone)]
pub struct IngestService {
    store: Arc<dyn ReadingStore>,
    invalidator: FreshnessInvalidator,
    clock: Arc<dyn Clock>,
    store_timeout: Duration,
}

impl IngestService {
    pub fn new(
        store: Arc<dyn ReadingStore>,
        invalidator: FreshnessInvalidator,
        clock: Arc<dyn Clock>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            invalidator,
            clock,
            store_timeout,
        }
    }

    /// Accept a webhook body in any supported envelope.
    pub async fn ingest_envelope(&self, body: Value) -> Result<Reading, IngestError> {
        self.ingest(IngestPayload::from_envelope(body)?).await
    }

    pub async fn ingest(&self, payload: IngestPayload) -> Result<Reading, IngestError> {
        let new_reading = payload.into_new_reading(self.clock.now())?;
        let reading = store_deadline(self.store_timeout, self.store.insert(new_reading)).await?;

        self.invalidator.on_write(&reading).await;

        info!(
            device_id = %reading.device_id,
            timestamp = %reading.timestamp,
            "Sensor reading persisted and cache invalidated"
        );
        Ok(reading)
    }
}
