use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::ReadingStore;
use crate::{
    db::models::{GroupedRow, NewReading, Reading},
    error::StoreError,
    query::bucket::{BucketKey, ChannelAccumulator},
};

/// Process-local reading table.
///
/// Used when no database is configured and by tests. Rows are kept in
/// insertion order; scans sort on the way out so backdated inserts behave the
/// same as in Postgres.
#[derive(Clone, Default)]
pub struct MemoryReadingStore {
    rows: Arc<RwLock<Vec<Reading>>>,
}

impl MemoryReadingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

fn in_window(ts: DateTime<Utc>, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> bool {
    start.map_or(true, |s| ts >= s) && end.map_or(true, |e| ts <= e)
}

#[async_trait]
impl ReadingStore for MemoryReadingStore {
    async fn insert(&self, reading: NewReading) -> Result<Reading, StoreError> {
        let row = Reading {
            id: Uuid::new_v4(),
            device_id: reading.device_id,
            timestamp: reading.timestamp,
            channels: reading.channels,
            created_at: Utc::now(),
        };
        self.rows.write().await.push(row.clone());
        Ok(row)
    }

    async fn scan_range(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Reading>, StoreError> {
        let mut rows: Vec<Reading> = self
            .rows
            .read()
            .await
            .iter()
            .filter(|r| r.device_id == device_id && in_window(r.timestamp, Some(start), Some(end)))
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.timestamp);
        Ok(rows)
    }

    async fn scan_range_grouped(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        key: BucketKey,
    ) -> Result<Vec<GroupedRow>, StoreError> {
        let rows = self.rows.read().await;
        let mut groups: BTreeMap<DateTime<Utc>, ChannelAccumulator> = BTreeMap::new();
        for r in rows
            .iter()
            .filter(|r| r.device_id == device_id && in_window(r.timestamp, Some(start), Some(end)))
        {
            groups.entry(key.floor(r.timestamp)).or_default().add(&r.channels);
        }
        Ok(groups
            .iter()
            .map(|(bucket_start, acc)| acc.finish(*bucket_start))
            .collect())
    }

    async fn min_timestamp(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self.rows.read().await.iter().map(|r| r.timestamp).min())
    }

    async fn latest_row(
        &self,
        device_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Option<Reading>, StoreError> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|r| r.device_id == device_id && in_window(r.timestamp, since, None))
            .max_by_key(|r| r.timestamp)
            .cloned())
    }

    async fn count_since(&self, since: Option<DateTime<Utc>>) -> Result<i64, StoreError> {
        let count = self
            .rows
            .read()
            .await
            .iter()
            .filter(|r| in_window(r.timestamp, since, None))
            .count();
        Ok(count as i64)
    }

    async fn scan_page(
        &self,
        device_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Reading>, i64), StoreError> {
        let mut rows: Vec<Reading> = self
            .rows
            .read()
            .await
            .iter()
            .filter(|r| r.device_id == device_id && in_window(r.timestamp, start, end))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        let total = rows.len() as i64;
        let page = rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
