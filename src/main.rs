use std::net::SocketAddr;
use imagecache::{config::ImageCacheConfig, router, ImageCacheState};

/// Image cache standalone server entry point.
///
/// Serves the files under `IMAGECACHE_WEB_ROOT`. Requests for images that
/// carry transformation commands (`?width=300&format=webp`) are processed
/// once and answered from the cache afterwards.
///
/// # Configuration
/// Environment variables:
/// - `IMAGECACHE_WEB_ROOT`, `IMAGECACHE_CACHE_DIR`, `IMAGECACHE_BASE_PATH`
/// - `IMAGECACHE_MAX_CACHE_DAYS`, `IMAGECACHE_BROWSER_MAX_AGE_DAYS`
/// - `IMAGECACHE_MAX_INPUT_SIZE`, `IMAGECACHE_DEFAULT_FORMAT`, `IMAGECACHE_DEFAULT_QUALITY`
/// - `IMAGECACHE_FINGERPRINT_SALT`, `IMAGECACHE_REMOTE_SOURCES` (`/prefix=https://host/path,...`)
/// - `PORT`: HTTP listen port (default: 8080)
/// - `RUST_LOG`: Logging verbosity (default: "imagecache=debug,tower_http=debug")
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "imagecache=debug,tower_http=debug".into())
        )
        .init();

    tracing::info!("Starting image cache server");

    let cfg = ImageCacheConfig::from_env()?;
    tracing::info!("Serving {:?}, caching into {:?}", cfg.web_root, cfg.cache_dir);
    let app = router(ImageCacheState::from_config(cfg)?);

    let port = std::env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse::<u16>()
        .unwrap_or(8080);

    // Bind to 0.0.0.0 for external access (required for containerized deployment)
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Server listening on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}
