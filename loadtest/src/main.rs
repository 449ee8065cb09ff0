use goose::prelude::*;
use rand::Rng;

/// Load testing suite for the image cache server.
///
/// Simulates production traffic against an image under the server's web root:
/// - Plain static requests (pass-through, no processing)
/// - Transformations with varied parameters (cache miss scenarios)
/// - A fixed variant requested over and over (cache hits)
/// - Conditional revalidation (304 scenarios)
/// - `/health` probes
///
/// # Usage
/// ```bash
/// cd loadtest
/// LOADTEST_IMAGE=/images/sample.jpg cargo run --release -- --host http://localhost:8080 --users 10 --hatch-rate 2 --run-time 60s
/// ```
///
/// # Performance Targets
/// - Pass-through and 304: <10ms p95 latency
/// - Cache hits: <20ms p95 latency
/// - Misses: <200ms p95 for WebP, <400ms for AVIF
/// - Failed requests: <1%

#[tokio::main]
async fn main() -> Result<(), GooseError> {
    GooseAttack::initialize()?
        .register_scenario(
            scenario!("MixedTraffic")
                // Untransformed requests measure the static handler baseline
                .register_transaction(transaction!(static_image).set_weight(3)?)
                // Primary workload: transformation with cache behavior
                .register_transaction(transaction!(resized_image).set_weight(10)?)
                .register_transaction(transaction!(health_check).set_weight(1)?)
        )
        .register_scenario(
            scenario!("CacheBehaviour")
                // Same variant every time: served from the cache after the first request
                .register_transaction(transaction!(cached_image).set_weight(15)?)
                // Fresh dimensions on every call force a full decode/resize/encode
                .register_transaction(transaction!(uncached_image).set_weight(5)?)
                // Browsers revalidating their copy should never reach the encoder
                .register_transaction(transaction!(revalidated_image).set_weight(5)?)
        )
        .execute()
        .await?;

    Ok(())
}

fn image_path() -> String {
    std::env::var("LOADTEST_IMAGE").unwrap_or_else(|_| "/images/sample.jpg".to_string())
}

/// Requests the original with no commands, so the server passes it through.
async fn static_image(user: &mut GooseUser) -> TransactionResult {
    let _goose = user.get(&image_path()).await?;
    Ok(())
}

/// Executes the full transformation pipeline with randomized parameters.
///
/// Parameter randomization spreads requests across cache keys, so the mix
/// contains both misses and hits after warmup.
async fn resized_image(user: &mut GooseUser) -> TransactionResult {
    // ThreadRng is !Send, keep it out of scope across the await
    let url = {
        let mut rng = rand::thread_rng();
        let width = rng.gen_range(200..800);
        let height = rng.gen_range(200..800);
        let modes = ["crop", "max", "stretch"];
        let formats = ["webp", "jpeg", "avif"];

        format!(
            "{}?width={}&height={}&rmode={}&format={}&quality=80",
            image_path(),
            width / 50 * 50,
            height / 50 * 50,
            modes[rng.gen_range(0..modes.len())],
            formats[rng.gen_range(0..formats.len())],
        )
    };

    let _goose = user.get(&url).await?;
    Ok(())
}

/// One fixed variant, so everything after warmup is a cache hit.
async fn cached_image(user: &mut GooseUser) -> TransactionResult {
    let url = format!("{}?width=500&height=500&format=webp&quality=80", image_path());
    let _goose = user.get(&url).await?;
    Ok(())
}

/// Millisecond-derived dimensions make (nearly) every request a miss.
async fn uncached_image(user: &mut GooseUser) -> TransactionResult {
    let timestamp = chrono::Utc::now().timestamp_millis();
    let width = 200 + (timestamp % 600);
    let height = 200 + ((timestamp / 600) % 600);

    let url = format!("{}?width={}&height={}&format=webp", image_path(), width, height);
    let _goose = user.get(&url).await?;
    Ok(())
}

/// Revalidates the cached variant with `If-Modified-Since: now`.
async fn revalidated_image(user: &mut GooseUser) -> TransactionResult {
    let url = format!("{}?width=500&height=500&format=webp&quality=80", image_path());
    let since = chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();

    let request_builder = user
        .get_request_builder(&GooseMethod::Get, &url)?
        .header("If-Modified-Since", since);
    let goose_request = GooseRequest::builder()
        .set_request_builder(request_builder)
        .expect_status_code(304)
        .build();
    let _goose = user.request(goose_request).await?;
    Ok(())
}

/// Liveness probe; baseline latency without any image work.
async fn health_check(user: &mut GooseUser) -> TransactionResult {
    let _goose = user.get("/health").await?;
    Ok(())
}
