//! Read-through cache in front of the reading store.

pub mod invalidator;
pub mod key;
pub mod memory;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    db::models::Reading,
    error::CacheError,
    query::{
        bucket::Bucket, logs::LogPage, range::RangeToken, series::SeriesPoint,
        status::StatusSnapshot,
    },
};

pub use invalidator::{FreshnessInvalidator, InvalidationPolicy};
pub use key::{CacheKey, QueryKind};
pub use memory::MemoryCache;

/// Cached value. Large payloads are shared, so a hit is a pointer copy.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Buckets(Arc<Vec<Bucket>>),
    Series(Arc<Vec<SeriesPoint>>),
    Latest(Reading),
    Status(Arc<StatusSnapshot>),
    MinTimestamp(Option<DateTime<Utc>>),
    LogPage(Arc<LogPage>),
}

/// Plain key/value store with per-entry expiry. No business logic.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Live entry for `key`; expired entries read as absent.
    async fn get(&self, key: &CacheKey) -> Result<Option<Payload>, CacheError>;

    async fn put(&self, key: CacheKey, payload: Payload, ttl: Duration) -> Result<(), CacheError>;

    async fn invalidate(&self, key: &CacheKey) -> Result<(), CacheError>;

    async fn invalidate_all(&self) -> Result<(), CacheError>;

    /// Number of live entries.
    async fn entry_count(&self) -> Result<usize, CacheError>;
}

/// Expiry class of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlClass {
    Short,
    Medium,
    Long,
    All,
    Latest,
    Status,
    LogPage,
}

impl TtlClass {
    pub fn for_range(token: RangeToken) -> Self {
        match token {
            RangeToken::OneHour => TtlClass::Short,
            RangeToken::SixHours | RangeToken::TwelveHours | RangeToken::OneDay => {
                TtlClass::Medium
            }
            RangeToken::FifteenDays | RangeToken::OneMonth | RangeToken::ThreeMonths => {
                TtlClass::Long
            }
            RangeToken::All => TtlClass::All,
        }
    }

    pub fn ttl(self) -> Duration {
        const MINUTE: u64 = 60;
        Duration::from_secs(match self {
            TtlClass::Short => 2 * MINUTE,
            TtlClass::Medium => 10 * MINUTE,
            TtlClass::Long => 60 * MINUTE,
            TtlClass::All => 120 * MINUTE,
            TtlClass::Latest => 30,
            TtlClass::Status => MINUTE,
            TtlClass::LogPage => 5 * MINUTE,
        })
    }
}
