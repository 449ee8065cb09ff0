use crate::cache::{Cache, CacheKey, CacheStats, CachedInfo};
use crate::config::ImageFormat;
use crate::{ImageCacheError, Result};
use serde::{Deserialize, Serialize};
use sled::Db;
use std::path::Path;
use time::OffsetDateTime;

/// Metadata stored alongside cached images
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CacheMetadata {
    pub key: String,
    pub format: ImageFormat,
    pub length: u64,
    pub last_modified_secs: i64,
    pub last_modified_nanos: u32,
}

impl CacheMetadata {
    fn last_modified(&self) -> Result<OffsetDateTime> {
        let ts = OffsetDateTime::from_unix_timestamp(self.last_modified_secs)
            .map_err(|e| ImageCacheError::CacheBackend(format!("corrupt timestamp for {}: {}", self.key, e)))?;
        Ok(ts.replace_nanosecond(self.last_modified_nanos).unwrap_or(ts))
    }
}

/// Sled-backed durable cache.
///
/// Each entry is two records, `data:<key>` and `meta:<key>`, written in a
/// single batch so readers never observe one without the other. Entries
/// survive restarts and are only replaced by a later `set` for the same key.
pub struct SledCache {
    db: Db,
}

impl SledCache {
    /// Open (or create) the database in `path`.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)
            .map_err(|e| ImageCacheError::CacheBackend(format!("Failed to open Sled database: {}", e)))?;
        Ok(Self { db })
    }

    fn metadata_key(key: &CacheKey) -> String {
        format!("meta:{}", key)
    }

    fn data_key(key: &CacheKey) -> String {
        format!("data:{}", key)
    }

    fn read_metadata(&self, key: &CacheKey) -> Result<Option<CacheMetadata>> {
        let Some(raw) = self.db.get(Self::metadata_key(key).as_bytes()).map_err(backend_err)? else {
            return Ok(None);
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| ImageCacheError::CacheBackend(format!("corrupt metadata for {}: {}", key, e)))
    }
}

fn backend_err(e: sled::Error) -> ImageCacheError {
    ImageCacheError::CacheBackend(e.to_string())
}

#[async_trait::async_trait]
impl Cache for SledCache {
    async fn is_expired(&self, key: &CacheKey, not_older_than: OffsetDateTime) -> Result<CachedInfo> {
        match self.read_metadata(key)? {
            Some(meta) => Ok(CachedInfo::for_entry(meta.last_modified()?, meta.length, Some(meta.format), not_older_than)),
            None => Ok(CachedInfo::missing()),
        }
    }

    async fn get(&self, key: &CacheKey, buf: &mut Vec<u8>) -> Result<usize> {
        let data = self
            .db
            .get(Self::data_key(key).as_bytes())
            .map_err(backend_err)?
            .ok_or_else(|| ImageCacheError::NotFound(format!("cache entry {}", key)))?;
        buf.extend_from_slice(&data);
        Ok(data.len())
    }

    async fn set(&self, key: &CacheKey, data: &[u8], format: ImageFormat) -> Result<OffsetDateTime> {
        let now = OffsetDateTime::now_utc();
        let metadata = CacheMetadata {
            key: key.to_string(),
            format,
            length: data.len() as u64,
            last_modified_secs: now.unix_timestamp(),
            last_modified_nanos: now.nanosecond(),
        };
        let meta_bytes = serde_json::to_vec(&metadata)
            .map_err(|e| ImageCacheError::CacheBackend(format!("Failed to encode cache metadata: {}", e)))?;

        let mut batch = sled::Batch::default();
        batch.insert(Self::data_key(key).as_bytes(), data);
        batch.insert(Self::metadata_key(key).as_bytes(), meta_bytes);
        self.db
            .apply_batch(batch)
            .map_err(|e| ImageCacheError::CacheBackend(format!("Failed to write cache entry: {}", e)))?;

        // Flush to disk
        self.db.flush_async().await.map_err(backend_err)?;

        Ok(now)
    }

    async fn stats(&self) -> Result<CacheStats> {
        let mut stats = CacheStats::default();
        for item in self.db.scan_prefix(b"meta:") {
            let (_, value) = item.map_err(backend_err)?;
            if let Ok(meta) = serde_json::from_slice::<CacheMetadata>(&value) {
                stats.total_size_bytes += meta.length;
                stats.entry_count += 1;
            }
        }
        Ok(stats)
    }
}
