use crate::config::ImageFormat;
use crate::sources::ImageSource;
use crate::{ImageCacheError, Result};
use axum::http::request::Parts;
use std::path::{Component, Path, PathBuf};
use time::OffsetDateTime;
use tokio::fs;
use tokio::io::AsyncReadExt;

/// Serves originals from a directory on local disk.
pub struct PhysicalFileSource {
    key: String,
    root: PathBuf,
    max_size: usize,
}

impl PhysicalFileSource {
    pub fn new(root: impl Into<PathBuf>, max_size: usize) -> Self {
        Self { key: String::new(), root: root.into(), max_size }
    }

    /// Claim a path prefix instead of acting as the catch-all file source.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Map a request path onto the root, refusing anything that would escape it.
    fn file_path(&self, path: &str) -> Option<PathBuf> {
        let relative = match path.get(..self.key.len()) {
            Some(head) if !self.key.is_empty() && head.eq_ignore_ascii_case(&self.key) => &path[self.key.len()..],
            _ => path,
        }
        .trim_start_matches('/');
        if relative.is_empty() || relative.contains('\\') {
            return None;
        }
        let relative = Path::new(relative);
        if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            return None;
        }
        Some(self.root.join(relative))
    }
}

#[async_trait::async_trait]
impl ImageSource for PhysicalFileSource {
    fn key(&self) -> &str {
        &self.key
    }

    fn is_physical(&self) -> bool {
        true
    }

    async fn is_valid_request(&self, _parts: &Parts, path: &str) -> bool {
        let Some(file) = self.file_path(path) else { return false };
        let known_image = file
            .extension()
            .and_then(|e| e.to_str())
            .and_then(ImageFormat::from_extension)
            .is_some();
        known_image && fs::metadata(&file).await.map(|m| m.is_file()).unwrap_or(false)
    }

    async fn last_modified(&self, _parts: &Parts, path: &str) -> Option<OffsetDateTime> {
        let file = self.file_path(path)?;
        let modified = fs::metadata(&file).await.ok()?.modified().ok()?;
        Some(OffsetDateTime::from(modified))
    }

    async fn read_into(&self, _parts: &Parts, path: &str, buf: &mut Vec<u8>) -> Result<()> {
        let file = self
            .file_path(path)
            .ok_or_else(|| ImageCacheError::NotFound(path.to_string()))?;
        let mut handle = fs::File::open(&file).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ImageCacheError::NotFound(file.display().to_string()),
            _ => ImageCacheError::SourceFetch(format!("{}: {}", file.display(), e)),
        })?;

        let len = handle
            .metadata()
            .await
            .map_err(|e| ImageCacheError::SourceFetch(e.to_string()))?
            .len();
        if len as usize > self.max_size {
            return Err(ImageCacheError::SourceFetch(format!(
                "{} is {} bytes, limit is {}",
                file.display(),
                len,
                self.max_size
            )));
        }

        buf.reserve(len as usize);
        handle
            .read_to_end(buf)
            .await
            .map_err(|e| ImageCacheError::SourceFetch(format!("{}: {}", file.display(), e)))?;
        Ok(())
    }
}
