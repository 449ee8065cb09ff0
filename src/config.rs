use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    jpeg,
    png,
    webp,
    avif,
}

impl ImageFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ImageFormat::jpeg => "image/jpeg",
            ImageFormat::png => "image/png",
            ImageFormat::webp => "image/webp",
            ImageFormat::avif => "image/avif",
        }
    }

    /// Detect format from a file extension, case-insensitively.
    pub fn from_extension(ext: &str) -> Option<ImageFormat> {
        match ext.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Some(ImageFormat::jpeg),
            "png" => Some(ImageFormat::png),
            "webp" => Some(ImageFormat::webp),
            "avif" => Some(ImageFormat::avif),
            _ => None,
        }
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageFormat::jpeg => write!(f, "jpeg"),
            ImageFormat::png => write!(f, "png"),
            ImageFormat::webp => write!(f, "webp"),
            ImageFormat::avif => write!(f, "avif"),
        }
    }
}

impl FromStr for ImageFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ImageFormat::from_extension(s.trim()).ok_or_else(|| ConfigError::InvalidFormat(s.to_string()))
    }
}

/// A prefixed HTTP origin, e.g. `/remote` -> `https://images.example.com/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSourceConfig {
    pub key: String,
    pub base_url: String,
}

pub const DEFAULT_QUALITY: u8 = 80;
pub const DEFAULT_MAX_CACHE_DAYS: u32 = 365;
pub const DEFAULT_BROWSER_MAX_AGE_DAYS: u32 = 7;

/// `cache_dir` value selecting the in-process backend instead of sled.
pub const MEMORY_CACHE_DIR: &str = ":memory:";

#[derive(Debug, Clone)]
pub struct ImageCacheConfig {
    pub web_root: PathBuf,
    pub cache_dir: PathBuf,
    pub base_path: String,
    pub max_cache_days: u32,
    pub browser_max_age_days: u32,
    pub max_input_size: usize, // bytes
    pub default_format: Option<ImageFormat>,
    pub default_quality: u8,
    pub fingerprint_salt: String,
    pub remote_sources: Vec<RemoteSourceConfig>,
    pub pool_retain: usize,
}

impl Default for ImageCacheConfig {
    fn default() -> Self {
        Self {
            web_root: PathBuf::from("./wwwroot"),
            cache_dir: PathBuf::from("./cache"),
            base_path: "/".into(),
            max_cache_days: DEFAULT_MAX_CACHE_DAYS,
            browser_max_age_days: DEFAULT_BROWSER_MAX_AGE_DAYS,
            max_input_size: 8 * 1024 * 1024,
            default_format: None,
            default_quality: DEFAULT_QUALITY,
            fingerprint_salt: String::new(),
            remote_sources: Vec::new(),
            pool_retain: 64,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Max input size must be > 0")] InvalidMaxInput,
    #[error("Default quality must be within 1..=100, got {0}")] InvalidQuality(u8),
    #[error("Base path must start with '/': {0}")] InvalidBasePath(String),
    #[error("Remote source key must start with '/': {0:?}")] InvalidRemoteKey(String),
    #[error("Remote source entry must look like key=url: {0}")] InvalidRemoteEntry(String),
    #[error("Unknown image format: {0}")] InvalidFormat(String),
    #[error("Invalid value for {name}: {value}")] InvalidValue { name: &'static str, value: String },
}

impl ImageCacheConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_input_size == 0 { return Err(ConfigError::InvalidMaxInput); }
        if !(1..=100).contains(&self.default_quality) {
            return Err(ConfigError::InvalidQuality(self.default_quality));
        }
        if !self.base_path.starts_with('/') {
            return Err(ConfigError::InvalidBasePath(self.base_path.clone()));
        }
        for remote in &self.remote_sources {
            if remote.key.len() < 2 || !remote.key.starts_with('/') {
                return Err(ConfigError::InvalidRemoteKey(remote.key.clone()));
            }
        }
        Ok(())
    }

    /// Load configuration from `IMAGECACHE_*` environment variables with fallback defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("IMAGECACHE_WEB_ROOT") { cfg.web_root = PathBuf::from(v); }
        if let Ok(v) = std::env::var("IMAGECACHE_CACHE_DIR") { cfg.cache_dir = PathBuf::from(v); }
        if let Ok(v) = std::env::var("IMAGECACHE_BASE_PATH") { cfg.base_path = v; }
        if let Ok(v) = std::env::var("IMAGECACHE_MAX_CACHE_DAYS") {
            cfg.max_cache_days = parse_var("IMAGECACHE_MAX_CACHE_DAYS", &v)?;
        }
        if let Ok(v) = std::env::var("IMAGECACHE_BROWSER_MAX_AGE_DAYS") {
            cfg.browser_max_age_days = parse_var("IMAGECACHE_BROWSER_MAX_AGE_DAYS", &v)?;
        }
        if let Ok(v) = std::env::var("IMAGECACHE_MAX_INPUT_SIZE") {
            cfg.max_input_size = parse_var("IMAGECACHE_MAX_INPUT_SIZE", &v)?;
        }
        if let Ok(v) = std::env::var("IMAGECACHE_DEFAULT_FORMAT") { cfg.default_format = Some(v.parse()?); }
        if let Ok(v) = std::env::var("IMAGECACHE_DEFAULT_QUALITY") {
            cfg.default_quality = parse_var("IMAGECACHE_DEFAULT_QUALITY", &v)?;
        }
        if let Ok(v) = std::env::var("IMAGECACHE_FINGERPRINT_SALT") { cfg.fingerprint_salt = v; }
        if let Ok(v) = std::env::var("IMAGECACHE_REMOTE_SOURCES") {
            cfg.remote_sources = parse_remote_sources(&v)?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Opaque digest of every setting that changes encoded output.
    ///
    /// Folded into each cache key, so changing the default format, quality
    /// or salt (or upgrading the crate) orphans previously cached entries.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(env!("CARGO_PKG_VERSION").as_bytes());
        hasher.update([0u8]);
        match self.default_format {
            Some(f) => hasher.update(f.to_string().as_bytes()),
            None => hasher.update(b"source"),
        }
        hasher.update([0u8, self.default_quality, 0u8]);
        hasher.update(self.fingerprint_salt.as_bytes());
        hex::encode(hasher.finalize())
    }
}

fn parse_var<T: FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { name, value: value.to_string() })
}

/// Parse `key=url,key=url` into remote source entries, keeping their order.
pub fn parse_remote_sources(raw: &str) -> Result<Vec<RemoteSourceConfig>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (key, url) = entry
                .split_once('=')
                .ok_or_else(|| ConfigError::InvalidRemoteEntry(entry.to_string()))?;
            Ok(RemoteSourceConfig { key: key.trim().to_string(), base_url: url.trim().to_string() })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ImageCacheConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_quality() {
        let cfg = ImageCacheConfig { default_quality: 0, ..Default::default() };
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidQuality(0))));
    }

    #[test]
    fn rejects_relative_remote_key() {
        let cfg = ImageCacheConfig {
            remote_sources: vec![RemoteSourceConfig { key: "blob".into(), base_url: "http://x/".into() }],
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidRemoteKey(_))));
    }

    #[test]
    fn parses_remote_source_list_in_order() {
        let parsed = parse_remote_sources("/blob=https://a.example/, /cdn=https://b.example/img").unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].key, "/blob");
        assert_eq!(parsed[1].base_url, "https://b.example/img");
        assert!(parse_remote_sources("nonsense").is_err());
    }

    #[test]
    fn fingerprint_tracks_output_settings() {
        let base = ImageCacheConfig::default();
        let quality = ImageCacheConfig { default_quality: 90, ..Default::default() };
        let salted = ImageCacheConfig { fingerprint_salt: "v2".into(), ..Default::default() };
        let unrelated = ImageCacheConfig { max_cache_days: 1, ..Default::default() };

        assert_ne!(base.fingerprint(), quality.fingerprint());
        assert_ne!(base.fingerprint(), salted.fingerprint());
        assert_eq!(base.fingerprint(), unrelated.fingerprint());
        assert_eq!(base.fingerprint().len(), 64);
    }
}
