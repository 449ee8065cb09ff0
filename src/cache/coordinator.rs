use crate::buffer::BufferPool;
use crate::cache::{Cache, CacheKey, CachedBuffer, CachedInfo};
use crate::config::ImageFormat;
use crate::Result;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

/// Front for the cache backend: applies the max-age policy and pools payloads.
///
/// There is no eviction sweep. Entries age out purely by comparing their
/// last-modified time with `now - max_cache_days` on every query.
#[derive(Clone)]
pub struct CacheCoordinator {
    backend: Arc<dyn Cache>,
    pool: Arc<BufferPool>,
    max_age: Duration,
}

impl CacheCoordinator {
    pub fn new(backend: Arc<dyn Cache>, pool: Arc<BufferPool>, max_cache_days: u32) -> Self {
        Self {
            backend,
            pool,
            max_age: Duration::days(i64::from(max_cache_days)),
        }
    }

    pub fn backend(&self) -> &Arc<dyn Cache> {
        &self.backend
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Oldest last-modified time still considered fresh at `now`.
    pub fn cutoff(&self, now: OffsetDateTime) -> OffsetDateTime {
        now - self.max_age
    }

    pub async fn query_freshness(&self, key: &CacheKey) -> CachedInfo {
        self.query_freshness_at(key, OffsetDateTime::now_utc()).await
    }

    /// A failing backend is reported as a miss so the request reprocesses
    /// instead of failing.
    pub async fn query_freshness_at(&self, key: &CacheKey, now: OffsetDateTime) -> CachedInfo {
        match self.backend.is_expired(key, self.cutoff(now)).await {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!("Freshness query failed for key={}, treating as expired: {}", key, e);
                CachedInfo::missing()
            }
        }
    }

    /// Persist `data` under `key` and return the new last-modified time.
    pub async fn store(&self, key: &CacheKey, data: &[u8], format: ImageFormat) -> Result<OffsetDateTime> {
        self.backend.set(key, data, format).await
    }

    /// Read a payload into a pooled buffer. Only valid after a fresh
    /// `query_freshness`; a vanished entry surfaces as `NotFound`.
    pub async fn fetch(&self, key: &CacheKey) -> Result<CachedBuffer> {
        let mut buffer = self.pool.rent(0);
        let length = self.backend.get(key, &mut buffer).await?;
        Ok(CachedBuffer { buffer, length })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStats, MemoryCache};
    use crate::commands::CommandSet;
    use crate::ImageCacheError;

    struct BrokenCache;

    #[async_trait::async_trait]
    impl Cache for BrokenCache {
        async fn is_expired(&self, _: &CacheKey, _: OffsetDateTime) -> Result<CachedInfo> {
            Err(ImageCacheError::CacheBackend("disk on fire".into()))
        }
        async fn get(&self, _: &CacheKey, _: &mut Vec<u8>) -> Result<usize> {
            Err(ImageCacheError::CacheBackend("disk on fire".into()))
        }
        async fn set(&self, _: &CacheKey, _: &[u8], _: ImageFormat) -> Result<OffsetDateTime> {
            Err(ImageCacheError::CacheBackend("disk on fire".into()))
        }
        async fn stats(&self) -> Result<CacheStats> {
            Ok(CacheStats::default())
        }
    }

    fn key() -> CacheKey {
        CacheKey::build("/cat.png", &[("width", "10")].into_iter().collect::<CommandSet>(), "fp")
    }

    #[tokio::test]
    async fn freshness_boundary_is_one_second_wide() {
        let max_days = 30;
        let coordinator = CacheCoordinator::new(Arc::new(MemoryCache::new()), BufferPool::new(2), max_days);
        let k = key();
        let stored_at = coordinator.store(&k, b"abc", ImageFormat::png).await.unwrap();

        // Pick "now" so the entry sits one second inside / outside the window.
        let window = Duration::days(i64::from(max_days));
        let inside = coordinator.query_freshness_at(&k, stored_at + window - Duration::seconds(1)).await;
        let outside = coordinator.query_freshness_at(&k, stored_at + window + Duration::seconds(1)).await;

        assert!(inside.exists && !inside.expired);
        assert!(outside.exists && outside.expired);
    }

    #[tokio::test]
    async fn zero_max_age_expires_everything_written_before_now() {
        let coordinator = CacheCoordinator::new(Arc::new(MemoryCache::new()), BufferPool::new(2), 0);
        let k = key();
        let stored_at = coordinator.store(&k, b"abc", ImageFormat::png).await.unwrap();
        assert!(coordinator.query_freshness_at(&k, stored_at + Duration::seconds(1)).await.expired);
    }

    #[tokio::test]
    async fn backend_failure_reads_as_expired() {
        let coordinator = CacheCoordinator::new(Arc::new(BrokenCache), BufferPool::new(2), 1);
        let info = coordinator.query_freshness(&key()).await;
        assert!(info.expired);
        assert!(!info.exists);
    }

    #[tokio::test]
    async fn fetch_round_trip_uses_pool() {
        let pool = BufferPool::new(2);
        let coordinator = CacheCoordinator::new(Arc::new(MemoryCache::new()), Arc::clone(&pool), 1);
        let k = key();
        coordinator.store(&k, b"hello world", ImageFormat::webp).await.unwrap();

        let cached = coordinator.fetch(&k).await.unwrap();
        assert_eq!(cached.length, 11);
        assert_eq!(&cached.buffer[..], b"hello world");
        assert_eq!(pool.outstanding(), 1);
        drop(cached);
        assert_eq!(pool.outstanding(), 0);
    }

    #[tokio::test]
    async fn failed_fetch_releases_buffer() {
        let pool = BufferPool::new(2);
        let coordinator = CacheCoordinator::new(Arc::new(MemoryCache::new()), Arc::clone(&pool), 1);
        assert!(matches!(coordinator.fetch(&key()).await, Err(ImageCacheError::NotFound(_))));
        assert_eq!(pool.rented(), 1);
        assert_eq!(pool.outstanding(), 0);
    }
}
