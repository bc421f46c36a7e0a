//! Access to persisted readings.
//!
//! The query core only ever issues range-filtered scans, grouped scans, and
//! a handful of point lookups; [`ReadingStore`] is exactly that surface.

pub mod memory;
pub mod postgres;

use std::{fmt, str::FromStr};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    db::models::{GroupedRow, NewReading, Reading},
    error::StoreError,
    query::bucket::BucketKey,
};

pub use memory::MemoryReadingStore;
pub use postgres::PgReadingStore;

/// Both range bounds are inclusive and every scan is ordered by ascending
/// timestamp unless stated otherwise.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Append one reading and return the stored row.
    async fn insert(&self, reading: NewReading) -> Result<Reading, StoreError>;

    /// Every reading of `device_id` in `[start, end]`.
    async fn scan_range(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Reading>, StoreError>;

    /// Readings of `device_id` in `[start, end]` grouped by `key`, one row per
    /// non-empty bucket, with per-channel means that ignore nulls.
    async fn scan_range_grouped(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        key: BucketKey,
    ) -> Result<Vec<GroupedRow>, StoreError>;

    /// Earliest timestamp across the whole table.
    async fn min_timestamp(&self) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Most recent reading of `device_id`, optionally no older than `since`.
    async fn latest_row(
        &self,
        device_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Option<Reading>, StoreError>;

    /// Number of readings (all devices) at or after `since`, or in total.
    async fn count_since(&self, since: Option<DateTime<Utc>>) -> Result<i64, StoreError>;

    /// One page of `device_id`'s readings, newest first, plus the total number
    /// of rows matching the filter.
    async fn scan_page(
        &self,
        device_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Reading>, i64), StoreError>;

    /// Cheapest possible round trip, used for reachability probes.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Which [`ReadingStore`] implementation the service runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "postgres" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(anyhow::anyhow!("unknown store backend: {other:?}")),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StoreBackend::Postgres => "postgres",
            StoreBackend::Memory => "memory",
        })
    }
}
