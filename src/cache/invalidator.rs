use std::{
    collections::HashSet,
    fmt,
    str::FromStr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{CacheKey, CacheStore, Payload, QueryKind};
use crate::{
    db::models::Reading,
    error::{cache_deadline, CacheError},
};

/// What happens to historical and log-page entries when a reading arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvalidationPolicy {
    /// Leave them until their TTL runs out.
    #[default]
    Ttl,
    /// Evict every tracked historical/log-page key on each write.
    EvictOnWrite,
}

impl FromStr for InvalidationPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "ttl" => Ok(Self::Ttl),
            "evict_on_write" => Ok(Self::EvictOnWrite),
            other => Err(anyhow::anyhow!("unknown invalidation policy: {other:?}")),
        }
    }
}

impl fmt::Display for InvalidationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InvalidationPolicy::Ttl => "ttl",
            InvalidationPolicy::EvictOnWrite => "evict_on_write",
        })
    }
}

/// Evicts cache entries a new reading could have made stale.
///
/// Always evicts the reading device's latest entry and the status rollup,
/// and the min-timestamp entry when the reading is older than the cached
/// minimum. Historical and log-page keys are evicted only under
/// [`InvalidationPolicy::EvictOnWrite`], and only if they were registered
/// through [`FreshnessInvalidator::track`].
///
/// Each write also bumps a generation counter. A reader that filled a key
/// from the store passes the generation it saw before reading to
/// [`FreshnessInvalidator::discard_if_written`], which drops the entry again
/// if a write landed in between.
#[derive(Clone)]
pub struct FreshnessInvalidator {
    cache: Arc<dyn CacheStore>,
    policy: InvalidationPolicy,
    timeout: Duration,
    tracked: Arc<RwLock<HashSet<CacheKey>>>,
    generation: Arc<AtomicU64>,
}

impl FreshnessInvalidator {
    pub fn new(cache: Arc<dyn CacheStore>, policy: InvalidationPolicy, timeout: Duration) -> Self {
        Self {
            cache,
            policy,
            timeout,
            tracked: Arc::default(),
            generation: Arc::default(),
        }
    }

    pub fn policy(&self) -> InvalidationPolicy {
        self.policy
    }

    /// Register a historical or log-page key for eviction on write.
    /// A no-op under the TTL policy.
    pub async fn track(&self, key: CacheKey) {
        if self.policy == InvalidationPolicy::EvictOnWrite {
            self.tracked.write().await.insert(key);
        }
    }

    pub async fn tracked_len(&self) -> usize {
        self.tracked.read().await.len()
    }

    /// Number of writes seen so far. Capture before a store read.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Whether a write of any reading can make an entry of `kind` stale
    /// before its TTL runs out.
    fn evicts(&self, kind: QueryKind) -> bool {
        match kind {
            QueryKind::Latest | QueryKind::Status | QueryKind::MinTimestamp => true,
            QueryKind::Historical | QueryKind::ChannelSeries | QueryKind::LogPage => {
                self.policy == InvalidationPolicy::EvictOnWrite
            }
        }
    }

    /// Call right after caching `key` from a store read that started at
    /// generation `seen`. Evicts the entry if a write happened since.
    ///
    /// The counter is bumped before `on_write` evicts, so either this sees
    /// the new generation or the writer's eviction runs after the put.
    pub async fn discard_if_written(&self, key: &CacheKey, seen: u64) {
        if !self.evicts(key.kind()) || self.generation() == seen {
            return;
        }
        debug!(key = %key, "Write raced a cache fill; dropping entry");
        self.evict(key).await;
    }

    /// Called after every successful insert. Never fails; cache errors are
    /// logged and the entry is left to expire.
    pub async fn on_write(&self, reading: &Reading) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.evict(&CacheKey::latest(&reading.device_id)).await;
        self.evict(&CacheKey::status()).await;

        if self.may_lower_min_timestamp(reading).await {
            self.evict(&CacheKey::min_timestamp()).await;
        }

        if self.policy == InvalidationPolicy::EvictOnWrite {
            let keys: Vec<CacheKey> = self.tracked.write().await.drain().collect();
            for key in &keys {
                self.evict(key).await;
            }
            debug!(evicted = keys.len(), "Evicted tracked entries on write");
        }
    }

    async fn may_lower_min_timestamp(&self, reading: &Reading) -> bool {
        match cache_deadline(self.timeout, self.cache.get(&CacheKey::min_timestamp())).await {
            Ok(Some(Payload::MinTimestamp(Some(min)))) => reading.timestamp < min,
            // Nothing cached is nothing to evict; a cached "no data" is now wrong.
            Ok(None) => false,
            Ok(Some(_)) => true,
            Err(e) => {
                warn!(error = %e, "Could not read cached min timestamp; evicting");
                true
            }
        }
    }

    async fn evict(&self, key: &CacheKey) {
        let result: Result<(), CacheError> =
            cache_deadline(self.timeout, self.cache.invalidate(key)).await;
        if let Err(e) = result {
            warn!(key = %key, error = %e, "Cache invalidation failed");
        }
    }
}
