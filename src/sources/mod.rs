//! Pluggable origins for raw image bytes and the resolution order between them.

pub mod physical;
pub mod remote;

pub use physical::PhysicalFileSource;
pub use remote::RemoteSource;

use crate::Result;
use axum::http::request::Parts;
use std::sync::Arc;
use time::OffsetDateTime;

/// An origin able to supply raw image bytes for a request path.
///
/// `path` is always relative to the application base path and percent-decoded.
#[async_trait::async_trait]
pub trait ImageSource: Send + Sync {
    /// Path prefix this source claims; empty for catch-all sources.
    fn key(&self) -> &str;

    /// Whether this is the default file-backed source, which is tried right
    /// after prefixed sources regardless of its registration position.
    fn is_physical(&self) -> bool {
        false
    }

    async fn is_valid_request(&self, parts: &Parts, path: &str) -> bool;

    /// Modification time of the original, when cheap to obtain. A cached
    /// entry older than this is reprocessed.
    async fn last_modified(&self, _parts: &Parts, _path: &str) -> Option<OffsetDateTime> {
        None
    }

    /// Append the raw bytes for `path` to `buf`.
    async fn read_into(&self, parts: &Parts, path: &str, buf: &mut Vec<u8>) -> Result<()>;
}

/// A source picked for a request together with the path it should serve.
#[derive(Clone)]
pub struct ResolvedSource {
    pub source: Arc<dyn ImageSource>,
    pub path: String,
}

impl std::fmt::Debug for ResolvedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSource")
            .field("key", &self.source.key())
            .field("physical", &self.source.is_physical())
            .field("path", &self.path)
            .finish()
    }
}

/// Ordered collection of sources. Registration order is significant.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    base_path: String,
    sources: Vec<Arc<dyn ImageSource>>,
}

impl SourceRegistry {
    pub fn new(base_path: impl Into<String>) -> Self {
        Self { base_path: base_path.into(), sources: Vec::new() }
    }

    pub fn register(&mut self, source: Arc<dyn ImageSource>) -> &mut Self {
        self.sources.push(source);
        self
    }

    pub fn with(mut self, source: Arc<dyn ImageSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Remove the configured base path, or `None` when `path` lies outside it.
    pub fn strip_base_path<'a>(&self, path: &'a str) -> Option<&'a str> {
        let base = self.base_path.trim_end_matches('/');
        if base.is_empty() {
            return Some(path);
        }
        match path.get(..base.len()) {
            Some(head) if head.eq_ignore_ascii_case(base) => {}
            _ => return None,
        }
        let rest = &path[base.len()..];
        if rest.is_empty() {
            Some("/")
        } else if rest.starts_with('/') {
            Some(rest)
        } else {
            None
        }
    }

    /// Pick the source that should serve `path`.
    ///
    /// 1. Prefixed sources whose key case-insensitively prefixes the path,
    ///    in registration order.
    /// 2. The physical source.
    /// 3. Remaining empty-key sources, in registration order.
    ///
    /// The first source whose `is_valid_request` accepts wins.
    pub async fn resolve(&self, parts: &Parts, path: &str) -> Option<ResolvedSource> {
        let path = self.strip_base_path(path)?;
        let lowered = path.to_ascii_lowercase();
        let mut tried = vec![false; self.sources.len()];

        for (i, source) in self.sources.iter().enumerate() {
            let key = source.key();
            if key.is_empty() || !lowered.starts_with(&key.to_ascii_lowercase()) {
                continue;
            }
            tried[i] = true;
            if source.is_valid_request(parts, path).await {
                tracing::debug!("Resolved {} to prefixed source {:?}", path, key);
                return Some(self.resolved(i, path));
            }
        }

        if let Some(i) = self.sources.iter().position(|s| s.is_physical()) {
            if !tried[i] {
                tried[i] = true;
                if self.sources[i].is_valid_request(parts, path).await {
                    tracing::debug!("Resolved {} to physical source", path);
                    return Some(self.resolved(i, path));
                }
            }
        }

        for (i, source) in self.sources.iter().enumerate() {
            if tried[i] || !source.key().is_empty() {
                continue;
            }
            if source.is_valid_request(parts, path).await {
                tracing::debug!("Resolved {} to fallback source #{}", path, i);
                return Some(self.resolved(i, path));
            }
        }

        None
    }

    fn resolved(&self, index: usize, path: &str) -> ResolvedSource {
        ResolvedSource { source: Arc::clone(&self.sources[index]), path: path.to_string() }
    }
}
