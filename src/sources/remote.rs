use crate::config::RemoteSourceConfig;
use crate::sources::ImageSource;
use crate::{ImageCacheError, Result};
use axum::http::request::Parts;
use futures::StreamExt;
use mime::Mime;
use reqwest::{Client, StatusCode, Url};

/// Fetches originals over HTTP for paths under a prefix.
///
/// `/remote/a/b.jpg` with key `/remote` and base `https://origin/img/`
/// fetches `https://origin/img/a/b.jpg`.
pub struct RemoteSource {
    key: String,
    base_url: Url,
    client: Client,
    max_size: usize,
}

impl RemoteSource {
    pub fn new(key: impl Into<String>, base_url: &str, max_size: usize) -> Result<Self> {
        // Url::join replaces the last segment unless the base ends with '/'.
        let base = if base_url.ends_with('/') { base_url.to_string() } else { format!("{}/", base_url) };
        let base_url = Url::parse(&base)
            .map_err(|e| ImageCacheError::Config(format!("invalid remote base url {}: {}", base_url, e)))?;
        Ok(Self { key: key.into(), base_url, client: Client::new(), max_size })
    }

    pub fn from_config(cfg: &RemoteSourceConfig, max_size: usize) -> Result<Self> {
        Self::new(cfg.key.clone(), &cfg.base_url, max_size)
    }

    fn upstream_url(&self, path: &str) -> Option<Url> {
        let rest = path.get(self.key.len()..)?.trim_start_matches('/');
        if rest.is_empty() {
            return None;
        }
        // Absolute URLs and dot segments would otherwise let a request leave the base.
        self.base_url
            .join(rest)
            .ok()
            .filter(|url| url.as_str().starts_with(self.base_url.as_str()))
    }
}

#[async_trait::async_trait]
impl ImageSource for RemoteSource {
    fn key(&self) -> &str {
        &self.key
    }

    async fn is_valid_request(&self, _parts: &Parts, path: &str) -> bool {
        self.upstream_url(path).is_some()
    }

    /// Streams the upstream body with size enforcement:
    /// 1. HTTP status code verification
    /// 2. Content-Type validation
    /// 3. Content-Length size limits
    /// 4. Streaming size enforcement (prevents size header spoofing)
    async fn read_into(&self, _parts: &Parts, path: &str, buf: &mut Vec<u8>) -> Result<()> {
        let url = self
            .upstream_url(path)
            .ok_or_else(|| ImageCacheError::NotFound(path.to_string()))?;
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ImageCacheError::SourceFetch(e.to_string()))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(ImageCacheError::NotFound(url.to_string()));
        }
        if !resp.status().is_success() {
            return Err(ImageCacheError::SourceFetch(format!("Upstream status: {}", resp.status())));
        }

        let ct = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        // Unknown MIME types continue - will be validated during decode
        if let Ok(m) = ct.parse::<Mime>() {
            if m.type_().as_str() != "image" && m.essence_str() != "application/octet-stream" {
                return Err(ImageCacheError::SourceFetch(format!("{} is not an image ({})", url, m)));
            }
        }

        if let Some(len) = resp.content_length() {
            if len as usize > self.max_size {
                return Err(ImageCacheError::SourceFetch("Input exceeds size limit".into()));
            }
            buf.reserve(len as usize);
        }

        let start = buf.len();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream
            .next()
            .await
            .transpose()
            .map_err(|e| ImageCacheError::SourceFetch(e.to_string()))?
        {
            if buf.len() - start + chunk.len() > self.max_size {
                return Err(ImageCacheError::SourceFetch("Input exceeds size limit".into()));
            }
            buf.extend_from_slice(&chunk);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_remainder_onto_base() {
        let source = RemoteSource::new("/remote", "https://origin.example/img", 1024).unwrap();
        assert_eq!(
            source.upstream_url("/remote/a/b.jpg").unwrap().as_str(),
            "https://origin.example/img/a/b.jpg"
        );
        assert!(source.upstream_url("/remote/").is_none());
        assert!(source.upstream_url("/rem").is_none());
    }

    #[test]
    fn stays_under_base() {
        let source = RemoteSource::new("/remote", "https://origin.example/img/", 1024).unwrap();
        assert!(source.upstream_url("/remote/http://evil.example/x.png").is_none());
        assert!(source.upstream_url("/remote/../secret.png").is_none());
    }

    #[test]
    fn rejects_unparseable_base() {
        assert!(matches!(RemoteSource::new("/r", "not a url", 1), Err(ImageCacheError::Config(_))));
    }
}
