use std::time::Duration;

use thiserror::Error;

/// Failure to reach or query the reading store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store query timed out after {0:?}")]
    Timeout(Duration),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Failure of the cache backend. Never surfaced to HTTP callers.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// Failure on the write path.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid payload: {0}")]
    Payload(String),

    #[error("invalid timestamp {0:?}")]
    Timestamp(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<serde_json::Error> for IngestError {
    fn from(e: serde_json::Error) -> Self {
        IngestError::Payload(e.to_string())
    }
}

/// Run `fut` under `limit`, mapping elapsed time to [`StoreError::Timeout`].
pub(crate) async fn store_deadline<T, F>(limit: Duration, fut: F) -> Result<T, StoreError>
where
    F: std::future::Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| StoreError::Timeout(limit))?
}

/// Run `fut` under `limit`, mapping elapsed time to [`CacheError::Timeout`].
pub(crate) async fn cache_deadline<T, F>(limit: Duration, fut: F) -> Result<T, CacheError>
where
    F: std::future::Future<Output = Result<T, CacheError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| CacheError::Timeout(limit))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn store_deadline_reports_timeout() {
        let limit = Duration::from_millis(50);
        let err = store_deadline(limit, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, StoreError>(())
        })
        .await
        .unwrap_err();

        assert!(matches!(err, StoreError::Timeout(d) if d == limit));
    }

    #[tokio::test]
    async fn store_deadline_passes_through_result() {
        let v = store_deadline(Duration::from_secs(1), async { Ok::<_, StoreError>(7) })
            .await
            .unwrap();
        assert_eq!(v, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn cache_deadline_reports_timeout() {
        let err = cache_deadline(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<_, CacheError>(())
        })
        .await
        .unwrap_err();

        assert!(matches!(err, CacheError::Timeout(_)));
    }
}
