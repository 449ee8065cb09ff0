use axum::{middleware::from_fn_with_state, routing::get, Router};
use std::sync::Arc;
use thiserror::Error;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub mod buffer;
pub mod cache;
pub mod commands;
pub mod conditional;
pub mod config;
pub mod metrics;
pub mod middleware;
pub mod sources;
pub mod state;
pub mod transform;

pub use crate::state::{ImageCacheState, StateBuilder};

use crate::config::ConfigError;
use crate::metrics::{cache_stats_handler, health_handler, metrics_handler};
use crate::middleware::image_cache_middleware;

#[derive(Error, Debug)]
pub enum ImageCacheError {
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Source fetch error: {0}")]
    SourceFetch(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Encode error: {0}")]
    Encode(String),
    #[error("Cache error: {0}")]
    CacheBackend(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ConfigError> for ImageCacheError {
    fn from(e: ConfigError) -> Self {
        ImageCacheError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ImageCacheError>;

/// Build the application router.
///
/// Requests carrying transformation commands for a resolvable image are
/// answered by the cache middleware; everything else falls through to the
/// static files under `web_root`.
pub fn router(state: Arc<ImageCacheState>) -> Router {
    // Observability endpoints sit outside the image middleware
    let observability_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/stats/cache", get(cache_stats_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state.clone());

    let static_files = Router::new()
        .fallback_service(ServeDir::new(&state.config.web_root))
        .layer(from_fn_with_state(state, image_cache_middleware));

    Router::new()
        .merge(observability_routes)
        .merge(static_files)
        .layer(TraceLayer::new_for_http())
}
