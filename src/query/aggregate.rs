use std::{sync::Arc, time::Duration};

use crate::{
    error::{store_deadline, StoreError},
    store::ReadingStore,
};

use super::{
    bucket::{Bucket, BucketKey},
    range::RangeSpec,
};

/// Turns a resolved window into an ordered series of buckets.
#[derive(Clone)]
pub struct Aggregator {
    store: Arc<dyn ReadingStore>,
    timeout: Duration,
}

impl Aggregator {
    pub fn new(store: Arc<dyn ReadingStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Raw ranges are a single ordered scan; grouped ranges are a single
    /// grouped scan with per-channel means. Buckets come back in ascending
    /// time order and never empty; an empty window yields an empty list.
    pub async fn aggregate(
        &self,
        spec: &RangeSpec,
        device_id: &str,
    ) -> Result<Vec<Bucket>, StoreError> {
        if spec.start > spec.end {
            return Ok(Vec::new());
        }

        let mut buckets: Vec<Bucket> = match spec.bucket_key {
            BucketKey::Raw => {
                let rows = store_deadline(
                    self.timeout,
                    self.store.scan_range(device_id, spec.start, spec.end),
                )
                .await?;
                rows.iter().map(Bucket::from_reading).collect()
            }
            key => {
                let groups = store_deadline(
                    self.timeout,
                    self.store
                        .scan_range_grouped(device_id, spec.start, spec.end, key),
                )
                .await?;
                groups
                    .iter()
                    .filter(|g| g.samples > 0)
                    .map(|g| Bucket::from_group(key, g))
                    .collect()
            }
        };

        // Stores already order their output; the sort is stable and keeps
        // equal raw timestamps in scan order.
        buckets.sort_by_key(|b| b.bucket_start);

        tracing::debug!(
            device_id = %device_id,
            range = %spec.token,
            bucket_key = %spec.bucket_key,
            buckets = buckets.len(),
            "Aggregated range"
        );
        Ok(buckets)
    }
}
