use std::{num::NonZeroUsize, sync::Arc, time::Duration};

use async_trait::async_trait;
use lru::LruCache;
use tokio::{sync::Mutex, time::Instant};

use super::{CacheKey, CacheStore, Payload};
use crate::error::CacheError;

/// Entries kept when no capacity is configured.
pub const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(1024) {
    Some(n) => n,
    None => unreachable!(),
};

struct Entry {
    payload: Payload,
    expires_at: Instant,
}

/// Process-local cache keyed by [`CacheKey`], bounded by entry count.
///
/// Clones share one map. Once full, a `put` evicts the least recently used
/// entry, after first dropping anything already expired. Expired entries are
/// also dropped lazily on read and when counting.
#[derive(Clone)]
pub struct MemoryCache {
    inner: Arc<Mutex<LruCache<CacheKey, Entry>>>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }
}

fn purge_expired(map: &mut LruCache<CacheKey, Entry>, now: Instant) {
    let expired: Vec<CacheKey> = map
        .iter()
        .filter(|(_, e)| e.expires_at <= now)
        .map(|(k, _)| k.clone())
        .collect();
    for key in &expired {
        map.pop(key);
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Payload>, CacheError> {
        let now = Instant::now();
        let mut map = self.inner.lock().await;
        match map.get(key) {
            None => Ok(None),
            Some(entry) if entry.expires_at > now => Ok(Some(entry.payload.clone())),
            Some(_) => {
                map.pop(key);
                Ok(None)
            }
        }
    }

    async fn put(&self, key: CacheKey, payload: Payload, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut map = self.inner.lock().await;
        if map.len() == map.cap().get() && !map.contains(&key) {
            purge_expired(&mut map, now);
        }
        map.put(
            key,
            Entry {
                payload,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn invalidate(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.inner.lock().await.pop(key);
        Ok(())
    }

    async fn invalidate_all(&self) -> Result<(), CacheError> {
        self.inner.lock().await.clear();
        Ok(())
    }

    async fn entry_count(&self) -> Result<usize, CacheError> {
        let mut map = self.inner.lock().await;
        purge_expired(&mut map, Instant::now());
        Ok(map.len())
    }
}
