use crate::ImageCacheState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Request counters, shared through [`ImageCacheState`].
#[derive(Debug, Default)]
pub struct Metrics {
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub transforms: AtomicU64,
    pub errors: AtomicU64,
    pub pass_throughs: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Hit rate in percent, 0 before any cacheable request.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let total = hits + self.cache_misses.load(Ordering::Relaxed);
        if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Prometheus text exposition of all counters.
    pub fn render(&self) -> String {
        format!(
            "# HELP imagecache_cache_hits_total Total number of cache hits\n\
             # TYPE imagecache_cache_hits_total counter\n\
             imagecache_cache_hits_total {}\n\
             # HELP imagecache_cache_misses_total Total number of cache misses\n\
             # TYPE imagecache_cache_misses_total counter\n\
             imagecache_cache_misses_total {}\n\
             # HELP imagecache_transforms_total Total number of image transformations\n\
             # TYPE imagecache_transforms_total counter\n\
             imagecache_transforms_total {}\n\
             # HELP imagecache_errors_total Total number of failed image requests\n\
             # TYPE imagecache_errors_total counter\n\
             imagecache_errors_total {}\n\
             # HELP imagecache_pass_through_total Requests handed to the static file handler\n\
             # TYPE imagecache_pass_through_total counter\n\
             imagecache_pass_through_total {}\n",
            self.cache_hits.load(Ordering::Relaxed),
            self.cache_misses.load(Ordering::Relaxed),
            self.transforms.load(Ordering::Relaxed),
            self.errors.load(Ordering::Relaxed),
            self.pass_throughs.load(Ordering::Relaxed),
        )
    }
}

/// Health check endpoint
pub async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "imagecache"
    }))
}

/// Metrics endpoint (Prometheus-compatible plain text)
pub async fn metrics_handler(State(state): State<Arc<ImageCacheState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Cache statistics endpoint
pub async fn cache_stats_handler(State(state): State<Arc<ImageCacheState>>) -> impl IntoResponse {
    let m = &state.metrics;
    let stats = match state.cache.backend().stats().await {
        Ok(stats) => stats,
        Err(e) => {
            tracing::error!("Failed to read cache stats: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, format!("Cache error: {}", e)).into_response();
        }
    };
    let pool = state.cache.pool();

    Json(json!({
        "cache": {
            "total_size_bytes": stats.total_size_bytes,
            "total_size_mb": stats.total_size_bytes as f64 / 1024.0 / 1024.0,
            "entry_count": stats.entry_count,
            "max_age_days": state.config.max_cache_days,
        },
        "requests": {
            "cache_hits": m.cache_hits.load(Ordering::Relaxed),
            "cache_misses": m.cache_misses.load(Ordering::Relaxed),
            "pass_through": m.pass_throughs.load(Ordering::Relaxed),
            "hit_rate_percent": m.hit_rate(),
        },
        "transforms": {
            "total": m.transforms.load(Ordering::Relaxed),
            "errors": m.errors.load(Ordering::Relaxed),
        },
        "buffers": {
            "rented": pool.rented(),
            "outstanding": pool.outstanding(),
            "idle": pool.idle(),
        }
    }))
    .into_response()
}
