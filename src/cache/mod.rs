// Re-export modules
pub mod control;
pub mod coordinator;
pub mod key;
pub mod memory;
pub mod sled_cache;

pub use control::CacheControl;
pub use coordinator::CacheCoordinator;
pub use key::CacheKey;
pub use memory::MemoryCache;
pub use sled_cache::SledCache;

use crate::buffer::PooledBuffer;
use crate::config::ImageFormat;
use crate::Result;
use serde::Serialize;
use time::OffsetDateTime;

/// Result of a freshness query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedInfo {
    pub exists: bool,
    /// `true` when the entry is missing or older than the requested cutoff.
    pub expired: bool,
    pub last_modified: OffsetDateTime,
    pub length: u64,
    /// Output format the payload was encoded with, when known.
    pub format: Option<ImageFormat>,
}

impl CachedInfo {
    pub fn missing() -> Self {
        Self {
            exists: false,
            expired: true,
            last_modified: OffsetDateTime::UNIX_EPOCH,
            length: 0,
            format: None,
        }
    }

    /// Describe a stored entry relative to `not_older_than`.
    pub fn for_entry(
        last_modified: OffsetDateTime,
        length: u64,
        format: Option<ImageFormat>,
        not_older_than: OffsetDateTime,
    ) -> Self {
        Self {
            exists: true,
            expired: last_modified < not_older_than,
            last_modified,
            length,
            format,
        }
    }
}

/// A cached payload in a pooled buffer; dropping it returns the buffer.
#[derive(Debug)]
pub struct CachedBuffer {
    pub buffer: PooledBuffer,
    pub length: usize,
}

/// Statistics about the cache
#[derive(Debug, Default, Serialize)]
pub struct CacheStats {
    pub total_size_bytes: u64,
    pub entry_count: usize,
}

/// Trait for cache backends
///
/// Backends must tolerate concurrent reads and concurrent writes to
/// different keys. Two writes to the same key may land in either order,
/// but each `set` must be atomic on its own.
#[async_trait::async_trait]
pub trait Cache: Send + Sync {
    /// Look up entry metadata without reading the payload.
    async fn is_expired(&self, key: &CacheKey, not_older_than: OffsetDateTime) -> Result<CachedInfo>;

    /// Append the payload for `key` to `buf`, returning its length.
    ///
    /// Fails with `ImageCacheError::NotFound` when there is no entry.
    async fn get(&self, key: &CacheKey, buf: &mut Vec<u8>) -> Result<usize>;

    /// Store a payload, replacing any previous entry, and return its
    /// last-modified timestamp.
    async fn set(&self, key: &CacheKey, data: &[u8], format: ImageFormat) -> Result<OffsetDateTime>;

    async fn stats(&self) -> Result<CacheStats>;
}
