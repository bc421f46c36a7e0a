use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};
use utoipa::ToSchema;

use super::{
    aggregate::Aggregator,
    bucket::Bucket,
    logs::{LogFilter, LogPage},
    range::{resolve, RangeToken},
    series::{self, SeriesPoint},
    status::{DatabaseStatus, HealthLevel, PerformanceStatus, SensorStatus, StatusSnapshot},
};
use crate::{
    cache::{CacheKey, CacheStore, FreshnessInvalidator, Payload, QueryKind, TtlClass},
    clock::Clock,
    db::models::{Channel, Reading, DEFAULT_DEVICE_ID},
    error::{cache_deadline, store_deadline, StoreError},
    store::ReadingStore,
};

/// Where a response payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Cache,
    Database,
}

#[derive(Debug, Clone)]
pub struct QuerySettings {
    pub default_device_id: String,
    /// How far back `get_latest` first looks before falling back to any row.
    pub recent_window: chrono::Duration,
    pub store_timeout: Duration,
    pub cache_timeout: Duration,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            default_device_id: DEFAULT_DEVICE_ID.to_owned(),
            recent_window: chrono::Duration::minutes(10),
            store_timeout: Duration::from_secs(5),
            cache_timeout: Duration::from_millis(500),
        }
    }
}

/// Read side of the service: cached historical series, the latest-reading
/// fast path, the status rollup and the paginated log.
///
/// Every lookup goes cache first. Cache failures are logged and treated as
/// misses; only store failures reach the caller. A fill whose store read
/// overlapped a write is dropped again, so a miss never re-caches data the
/// write just invalidated.
#[derive(Clone)]
pub struct SensorQueryService {
    store: Arc<dyn ReadingStore>,
    cache: Arc<dyn CacheStore>,
    invalidator: FreshnessInvalidator,
    clock: Arc<dyn Clock>,
    aggregator: Aggregator,
    settings: QuerySettings,
    started_at: Instant,
}

impl SensorQueryService {
    pub fn new(
        store: Arc<dyn ReadingStore>,
        cache: Arc<dyn CacheStore>,
        invalidator: FreshnessInvalidator,
        clock: Arc<dyn Clock>,
        settings: QuerySettings,
    ) -> Self {
        Self {
            aggregator: Aggregator::new(store.clone(), settings.store_timeout),
            store,
            cache,
            invalidator,
            clock,
            settings,
            started_at: Instant::now(),
        }
    }

    pub fn default_device_id(&self) -> &str {
        &self.settings.default_device_id
    }

    /// Most recent reading of `device_id`, preferring one inside the recency
    /// window. Absence is not cached, so the first write is visible at once.
    pub async fn get_latest(&self, device_id: &str) -> Result<(Option<Reading>, Source), StoreError> {
        let key = CacheKey::latest(device_id);
        if let Some(Payload::Latest(reading)) = self.cache_get(&key).await {
            return Ok((Some(reading), Source::Cache));
        }

        let seen = self.invalidator.generation();
        let since = self.clock.now() - self.settings.recent_window;
        let recent = self.store_call(self.store.latest_row(device_id, Some(since))).await?;
        let latest = match recent {
            Some(r) => Some(r),
            None => self.store_call(self.store.latest_row(device_id, None)).await?,
        };

        if let Some(reading) = &latest {
            self.fill(key, Payload::Latest(reading.clone()), TtlClass::Latest.ttl(), seen)
                .await;
        }
        Ok((latest, Source::Database))
    }

    /// Bucketed series for `token`, served from cache when possible.
    pub async fn get_historical(
        &self,
        token: RangeToken,
        device_id: &str,
    ) -> Result<(Arc<Vec<Bucket>>, Source), StoreError> {
        let key = CacheKey::historical(token, device_id);
        if let Some(Payload::Buckets(buckets)) = self.cache_get(&key).await {
            return Ok((buckets, Source::Cache));
        }

        let seen = self.invalidator.generation();
        let buckets = Arc::new(self.aggregate(token, device_id).await?);

        self.fill(
            key,
            Payload::Buckets(buckets.clone()),
            TtlClass::for_range(token).ttl(),
            seen,
        )
        .await;
        Ok((buckets, Source::Database))
    }

    /// One channel's bucket means for `token`, skipping buckets where the
    /// channel had no value. Cached separately from the full series.
    pub async fn get_channel_series(
        &self,
        channel: Channel,
        token: RangeToken,
        device_id: &str,
    ) -> Result<(Arc<Vec<SeriesPoint>>, Source), StoreError> {
        let key = CacheKey::channel_series(channel, token, device_id);
        if let Some(Payload::Series(points)) = self.cache_get(&key).await {
            return Ok((points, Source::Cache));
        }

        let seen = self.invalidator.generation();
        let buckets = self.aggregate(token, device_id).await?;
        let points = Arc::new(series::project(channel, &buckets));

        self.fill(
            key,
            Payload::Series(points.clone()),
            TtlClass::for_range(token).ttl(),
            seen,
        )
        .await;
        Ok((points, Source::Database))
    }

    /// Earliest reading timestamp in the store, cached like the `all` range.
    pub async fn min_timestamp(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let key = CacheKey::min_timestamp();
        if let Some(Payload::MinTimestamp(ts)) = self.cache_get(&key).await {
            return Ok(ts);
        }

        let seen = self.invalidator.generation();
        let ts = self.store_call(self.store.min_timestamp()).await?;
        self.fill(key, Payload::MinTimestamp(ts), TtlClass::All.ttl(), seen)
            .await;
        Ok(ts)
    }

    /// Health rollup. A failed store probe is reported inside the snapshot
    /// rather than as an error, and such snapshots are never cached.
    pub async fn get_status(&self) -> Result<(Arc<StatusSnapshot>, Source), StoreError> {
        let key = CacheKey::status();
        if let Some(Payload::Status(snapshot)) = self.cache_get(&key).await {
            return Ok((snapshot, Source::Cache));
        }

        let seen = self.invalidator.generation();
        let now = self.clock.now();
        let database = self.probe_database().await;
        let probe_ok = database.response_time_ms.is_some();

        let (sensors, performance) = if probe_ok {
            (self.sensor_status(now).await?, self.performance(now).await?)
        } else {
            (
                SensorStatus {
                    status: HealthLevel::Error,
                    device_id: self.settings.default_device_id.clone(),
                    last_reading_at: None,
                    minutes_since_last: None,
                    recent_count: 0,
                },
                PerformanceStatus {
                    data_points_last_hour: 0,
                    data_points_last_day: 0,
                    total_data_points: 0,
                    uptime_secs: self.started_at.elapsed().as_secs(),
                    cache_entries: self.cache_entries().await,
                },
            )
        };

        let snapshot = Arc::new(StatusSnapshot {
            database,
            sensors,
            performance,
            last_check: now,
        });

        if snapshot.is_cacheable() {
            self.fill(key, Payload::Status(snapshot.clone()), TtlClass::Status.ttl(), seen)
                .await;
        }
        Ok((snapshot, Source::Database))
    }

    /// One page of raw readings, newest first.
    pub async fn get_log_page(&self, filter: &LogFilter) -> Result<(Arc<LogPage>, Source), StoreError> {
        let key = CacheKey::log_page(filter);
        if let Some(Payload::LogPage(page)) = self.cache_get(&key).await {
            return Ok((page, Source::Cache));
        }

        let seen = self.invalidator.generation();
        let (data, total) = self
            .store_call(self.store.scan_page(
                &filter.device_id,
                filter.start_bound(),
                filter.end_bound(),
                filter.offset(),
                filter.limit(),
            ))
            .await?;
        let page = Arc::new(LogPage { data, total });

        self.fill(key, Payload::LogPage(page.clone()), TtlClass::LogPage.ttl(), seen)
            .await;
        Ok((page, Source::Database))
    }

    async fn aggregate(&self, token: RangeToken, device_id: &str) -> Result<Vec<Bucket>, StoreError> {
        let min_ts = match token {
            RangeToken::All => self.min_timestamp().await?,
            _ => None,
        };
        let spec = resolve(token, self.clock.now(), min_ts);
        self.aggregator.aggregate(&spec, device_id).await
    }

    async fn probe_database(&self) -> DatabaseStatus {
        let started = Instant::now();
        match self.store_call(self.store.ping()).await {
            Ok(()) => {
                let ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                DatabaseStatus {
                    status: HealthLevel::from_probe_ms(ms),
                    response_time_ms: Some(ms),
                    error: None,
                }
            }
            Err(e) => {
                warn!(error = %e, "Database probe failed");
                DatabaseStatus {
                    status: HealthLevel::Error,
                    response_time_ms: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn sensor_status(&self, now: DateTime<Utc>) -> Result<SensorStatus, StoreError> {
        let device_id = &self.settings.default_device_id;
        let last = self.store_call(self.store.latest_row(device_id, None)).await?;
        let last_reading_at = last.map(|r| r.timestamp);
        let minutes_since_last = last_reading_at.map(|ts| (now - ts).num_minutes().max(0));
        let recent_count = self
            .store_call(self.store.count_since(Some(now - chrono::Duration::minutes(30))))
            .await?;

        Ok(SensorStatus {
            status: HealthLevel::from_staleness(minutes_since_last),
            device_id: device_id.clone(),
            last_reading_at,
            minutes_since_last,
            recent_count,
        })
    }

    async fn performance(&self, now: DateTime<Utc>) -> Result<PerformanceStatus, StoreError> {
        let last_hour = now - chrono::Duration::hours(1);
        let last_day = now - chrono::Duration::days(1);
        Ok(PerformanceStatus {
            data_points_last_hour: self.store_call(self.store.count_since(Some(last_hour))).await?,
            data_points_last_day: self.store_call(self.store.count_since(Some(last_day))).await?,
            total_data_points: self.store_call(self.store.count_since(None)).await?,
            uptime_secs: self.started_at.elapsed().as_secs(),
            cache_entries: self.cache_entries().await,
        })
    }

    async fn cache_entries(&self) -> usize {
        match cache_deadline(self.settings.cache_timeout, self.cache.entry_count()).await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "Cache entry count unavailable");
                0
            }
        }
    }

    async fn store_call<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: std::future::Future<Output = Result<T, StoreError>>,
    {
        store_deadline(self.settings.store_timeout, fut).await
    }

    async fn cache_get(&self, key: &CacheKey) -> Option<Payload> {
        match cache_deadline(self.settings.cache_timeout, self.cache.get(key)).await {
            Ok(Some(payload)) => {
                debug!(key = %key, "Cache hit");
                Some(payload)
            }
            Ok(None) => {
                debug!(key = %key, "Cache miss");
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed; querying store");
                None
            }
        }
    }

    /// Cache a store result read at generation `seen`.
    async fn fill(&self, key: CacheKey, payload: Payload, ttl: Duration, seen: u64) {
        if let Err(e) =
            cache_deadline(self.settings.cache_timeout, self.cache.put(key.clone(), payload, ttl)).await
        {
            warn!(key = %key, error = %e, "Cache write failed");
            return;
        }
        if matches!(
            key.kind(),
            QueryKind::Historical | QueryKind::ChannelSeries | QueryKind::LogPage
        ) {
            self.invalidator.track(key.clone()).await;
        }
        self.invalidator.discard_if_written(&key, seen).await;
    }
}
