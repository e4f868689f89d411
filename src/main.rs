use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use client_rate_limiter::config::Settings;
use client_rate_limiter::TokenBucketLimiter;

async fn simulate(
    limiter: &TokenBucketLimiter,
    client_id: &str,
    requests: std::ops::Range<usize>,
    pause: Duration,
) -> anyhow::Result<()> {
    for i in requests {
        let acquired = limiter.try_acquire(client_id)?;
        info!(
            "Request {}: {} - Current Tokens: {}",
            i + 1,
            if acquired { "Acquired" } else { "Denied" },
            limiter.current_tokens(client_id)
        );
        tokio::time::sleep(pause).await;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&settings.log_level)?)
        .init();

    let limiter = settings.build_limiter()?;
    info!(
        "Rate limiter ready: capacity {}, refill {} tokens/s, strategy {:?}",
        limiter.capacity(),
        limiter.refill_rate(),
        limiter.strategy()
    );

    let client_1 = "user-123";
    let client_2 = "service-abc";

    info!("Simulating requests for client: {}", client_1);
    simulate(&limiter, client_1, 0..15, Duration::from_millis(50)).await?;

    info!("Waiting for bucket to refill...");
    tokio::time::sleep(Duration::from_secs(1)).await;

    info!("Simulating more requests for client: {} after refill", client_1);
    simulate(&limiter, client_1, 15..20, Duration::from_millis(50)).await?;

    // Independent bucket
    info!("Simulating requests for client: {}", client_2);
    simulate(&limiter, client_2, 0..5, Duration::from_millis(100)).await?;

    limiter.log_stats();
    Ok(())
}
