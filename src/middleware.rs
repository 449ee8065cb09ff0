//! The request path: decide whether a request is an image transformation,
//! answer it from the cache or by processing the source, and otherwise hand
//! it to the next handler untouched.

use crate::cache::{CacheKey, CachedInfo};
use crate::commands::{parse_commands, CommandSet};
use crate::conditional::ImageContext;
use crate::metrics::Metrics;
use crate::sources::ResolvedSource;
use crate::{ImageCacheError, ImageCacheState, Result};
use axum::extract::{Request, State};
use axum::http::request::Parts;
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use percent_encoding::percent_decode_str;
use std::sync::Arc;

/// Content type for cache entries whose format was not recorded.
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

pub async fn image_cache_middleware(
    State(state): State<Arc<ImageCacheState>>,
    request: Request,
    next: Next,
) -> Response {
    if !matches!(*request.method(), Method::GET | Method::HEAD) {
        return next.run(request).await;
    }

    let commands = parse_commands(request.uri().query());
    if commands.is_empty() {
        Metrics::record(&state.metrics.pass_throughs);
        return next.run(request).await;
    }

    let decoded = percent_decode_str(request.uri().path()).decode_utf8().map(|p| p.into_owned());
    let path = match decoded {
        Ok(path) => path,
        Err(e) => {
            tracing::debug!("Passing through undecodable path {}: {}", request.uri().path(), e);
            Metrics::record(&state.metrics.pass_throughs);
            return next.run(request).await;
        }
    };

    let (parts, body) = request.into_parts();
    let resolved = state.sources.resolve(&parts, &path).await;
    let Some(resolved) = resolved else {
        tracing::debug!("No source accepts {}, passing through", path);
        Metrics::record(&state.metrics.pass_throughs);
        return next.run(axum::http::Request::from_parts(parts, body)).await;
    };

    let key = CacheKey::build(&resolved.path, &commands, &state.fingerprint);
    match serve(&state, &parts, &resolved, commands, &key).await {
        Ok(response) => response,
        Err(e) => failure_response(&state, &key, &resolved.path, e),
    }
}

async fn serve(
    state: &ImageCacheState,
    parts: &Parts,
    resolved: &ResolvedSource,
    commands: CommandSet,
    key: &CacheKey,
) -> Result<Response> {
    let mut info = state.cache.query_freshness(key).await;
    if !info.expired {
        if let Some(modified) = resolved.source.last_modified(parts, &resolved.path).await {
            if modified > info.last_modified {
                tracing::debug!("Source for key={} changed after it was cached", key);
                info.expired = true;
            }
        }
    }

    if info.expired {
        serve_processed(state, parts, resolved, commands, key).await
    } else {
        serve_cached(state, parts, &info, key).await
    }
}

async fn serve_cached(state: &ImageCacheState, parts: &Parts, info: &CachedInfo, key: &CacheKey) -> Result<Response> {
    tracing::info!("Cache hit for key={}", key);
    Metrics::record(&state.metrics.cache_hits);

    let content_type = info.format.map(|f| f.content_type()).unwrap_or(FALLBACK_CONTENT_TYPE);
    let ctx = ImageContext::new(parts, content_type, info.last_modified, info.length, &state.cache_control);
    let precondition = ctx.precondition_state();

    // HEAD, 304 and 412 never read the payload.
    if !ctx.requires_body(precondition) {
        return Ok(ctx.respond(precondition, None));
    }

    // The entry may have been rewritten since the freshness query, so the
    // validators are rebuilt from the bytes actually served.
    let cached = state.cache.fetch(key).await?;
    let ctx = ImageContext::new(parts, content_type, info.last_modified, cached.length as u64, &state.cache_control);
    let precondition = ctx.precondition_state();
    let body = ctx.requires_body(precondition).then(|| {
        let mut buffer = cached.buffer;
        buffer.truncate(cached.length);
        buffer.into_bytes()
    });
    Ok(ctx.respond(precondition, body))
}

async fn serve_processed(
    state: &ImageCacheState,
    parts: &Parts,
    resolved: &ResolvedSource,
    commands: CommandSet,
    key: &CacheKey,
) -> Result<Response> {
    tracing::info!("Cache miss for key={}, processing {}", key, resolved.path);
    Metrics::record(&state.metrics.cache_misses);

    let pool = state.cache.pool();
    let mut raw = pool.rent(0);
    resolved.source.read_into(parts, &resolved.path, &mut raw).await?;
    let out = pool.rent(raw.len());

    let (encoded, format) = state.pipeline.run(raw, commands, out).await?;
    Metrics::record(&state.metrics.transforms);

    let last_modified = state.cache.store(key, &encoded, format).await?;
    tracing::debug!("Stored {} bytes of {} for key={}", encoded.len(), format, key);

    let ctx = ImageContext::new(parts, format.content_type(), last_modified, encoded.len() as u64, &state.cache_control);
    let precondition = ctx.precondition_state();
    let body = ctx.requires_body(precondition).then(|| encoded.into_bytes());
    Ok(ctx.respond(precondition, body))
}

/// Log a terminated request and answer it with an empty body.
fn failure_response(state: &ImageCacheState, key: &CacheKey, path: &str, err: ImageCacheError) -> Response {
    Metrics::record(&state.metrics.errors);
    match &err {
        ImageCacheError::Internal(_) => {
            tracing::error!("Internal contract violation serving {} (key={}): {:?}", path, key, err)
        }
        _ => tracing::error!("Failed to serve {} (key={}): {:?}", path, key, err),
    }
    let status = match err {
        ImageCacheError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    status.into_response()
}
