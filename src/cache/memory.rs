use crate::cache::{Cache, CacheKey, CacheStats, CachedInfo};
use crate::config::ImageFormat;
use crate::{ImageCacheError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;

struct Entry {
    data: Arc<[u8]>,
    format: ImageFormat,
    last_modified: OffsetDateTime,
}

/// In-process cache backend. Entries live until overwritten or the process exits.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait::async_trait]
impl Cache for MemoryCache {
    async fn is_expired(&self, key: &CacheKey, not_older_than: OffsetDateTime) -> Result<CachedInfo> {
        let entries = self.entries.read();
        Ok(match entries.get(key.as_str()) {
            Some(e) => CachedInfo::for_entry(e.last_modified, e.data.len() as u64, Some(e.format), not_older_than),
            None => CachedInfo::missing(),
        })
    }

    async fn get(&self, key: &CacheKey, buf: &mut Vec<u8>) -> Result<usize> {
        // Clone the Arc so the copy happens outside the lock.
        let data = self
            .entries
            .read()
            .get(key.as_str())
            .map(|e| Arc::clone(&e.data))
            .ok_or_else(|| ImageCacheError::NotFound(format!("cache entry {}", key)))?;
        buf.extend_from_slice(&data);
        Ok(data.len())
    }

    async fn set(&self, key: &CacheKey, data: &[u8], format: ImageFormat) -> Result<OffsetDateTime> {
        let last_modified = OffsetDateTime::now_utc();
        let entry = Entry { data: Arc::from(data), format, last_modified };
        self.entries.write().insert(key.as_str().to_string(), entry);
        Ok(last_modified)
    }

    async fn stats(&self) -> Result<CacheStats> {
        let entries = self.entries.read();
        Ok(CacheStats {
            total_size_bytes: entries.values().map(|e| e.data.len() as u64).sum(),
            entry_count: entries.len(),
        })
    }
}
