use crate::buffer::BufferPool;
use crate::cache::{Cache, CacheControl, CacheCoordinator, MemoryCache, SledCache};
use crate::config::{ImageCacheConfig, MEMORY_CACHE_DIR};
use crate::metrics::Metrics;
use crate::sources::{ImageSource, PhysicalFileSource, RemoteSource, SourceRegistry};
use crate::transform::{default_processors, ImageCodec, ImagePipeline, ImageProcessor};
use crate::transform::ImageCrateCodec;
use crate::Result;
use std::sync::Arc;

/// Everything a request needs, built once at startup and shared.
pub struct ImageCacheState {
    pub config: Arc<ImageCacheConfig>,
    pub fingerprint: String,
    pub sources: SourceRegistry,
    pub pipeline: Arc<ImagePipeline>,
    pub cache: CacheCoordinator,
    pub cache_control: CacheControl,
    pub metrics: Metrics,
}

impl ImageCacheState {
    /// Validate `config` and build the default wiring: sled (or the
    /// in-memory backend for `:memory:`), remote sources in configuration
    /// order followed by the web root, and the built-in processors.
    pub fn from_config(config: ImageCacheConfig) -> Result<Arc<Self>> {
        StateBuilder::new(config).build()
    }
}

/// Assembles an [`ImageCacheState`], letting callers swap out any collaborator.
pub struct StateBuilder {
    config: ImageCacheConfig,
    backend: Option<Arc<dyn Cache>>,
    pool: Option<Arc<BufferPool>>,
    codec: Option<Arc<dyn ImageCodec>>,
    processors: Option<Vec<Arc<dyn ImageProcessor>>>,
    sources: Option<Vec<Arc<dyn ImageSource>>>,
}

impl StateBuilder {
    pub fn new(config: ImageCacheConfig) -> Self {
        Self { config, backend: None, pool: None, codec: None, processors: None, sources: None }
    }

    pub fn backend(mut self, backend: Arc<dyn Cache>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn pool(mut self, pool: Arc<BufferPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn codec(mut self, codec: Arc<dyn ImageCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn processors(mut self, processors: Vec<Arc<dyn ImageProcessor>>) -> Self {
        self.processors = Some(processors);
        self
    }

    /// Replace the configured sources. Order is resolution order.
    pub fn sources(mut self, sources: Vec<Arc<dyn ImageSource>>) -> Self {
        self.sources = Some(sources);
        self
    }

    pub fn build(self) -> Result<Arc<ImageCacheState>> {
        let config = self.config;
        config.validate()?;

        let backend: Arc<dyn Cache> = match self.backend {
            Some(backend) => backend,
            None if config.cache_dir.as_os_str() == MEMORY_CACHE_DIR => {
                tracing::info!("Using in-memory cache backend");
                Arc::new(MemoryCache::new())
            }
            None => {
                tracing::info!("Opening sled cache at {:?}", config.cache_dir);
                Arc::new(SledCache::new(&config.cache_dir)?)
            }
        };
        let pool = self.pool.unwrap_or_else(|| BufferPool::new(config.pool_retain));

        let sources = match self.sources {
            Some(sources) => sources,
            None => default_sources(&config)?,
        };
        let mut registry = SourceRegistry::new(config.base_path.clone());
        for source in sources {
            registry.register(source);
        }

        let pipeline = ImagePipeline::new(
            self.codec.unwrap_or_else(|| Arc::new(ImageCrateCodec)),
            self.processors.unwrap_or_else(default_processors),
            config.default_format,
            config.default_quality,
        );

        let fingerprint = config.fingerprint();
        tracing::info!(
            "Image cache ready: {} source(s), max age {} day(s), fingerprint {}",
            registry.len(),
            config.max_cache_days,
            &fingerprint[..12.min(fingerprint.len())]
        );

        Ok(Arc::new(ImageCacheState {
            fingerprint,
            sources: registry,
            pipeline: Arc::new(pipeline),
            cache: CacheCoordinator::new(backend, pool, config.max_cache_days),
            cache_control: CacheControl::for_days(config.browser_max_age_days),
            metrics: Metrics::new(),
            config: Arc::new(config),
        }))
    }
}

fn default_sources(config: &ImageCacheConfig) -> Result<Vec<Arc<dyn ImageSource>>> {
    let mut sources: Vec<Arc<dyn ImageSource>> = Vec::with_capacity(config.remote_sources.len() + 1);
    for remote in &config.remote_sources {
        sources.push(Arc::new(RemoteSource::from_config(remote, config.max_input_size)?));
    }
    sources.push(Arc::new(PhysicalFileSource::new(&config.web_root, config.max_input_size)));
    Ok(sources)
}
