// Elastic connection pool - demo binary
// The library lives in lib.rs; run this with: cargo run --features cli

use elastic_connpool::memory::MemoryBackend;
use elastic_connpool::{ElasticPool, PoolConfiguration, PoolResult};
use std::time::Duration;

#[tokio::main]
async fn main() -> PoolResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,elastic_connpool=debug")
            }),
        )
        .init();

    let config = PoolConfiguration::from_env().unwrap_or_else(|err| {
        tracing::info!(
            reason = %err,
            "no pool settings in the environment, using the demo defaults"
        );
        PoolConfiguration::new("mem://demo")
            .with_fixed_size(2)
            .with_max_size(3)
            .with_fast_path_timeout(Duration::from_millis(5))
    });

    let pool = ElasticPool::new(MemoryBackend::new(), config).await?;
    println!("=== Elastic connection pool ===");

    let first = pool.acquire().await?;
    let second = pool.acquire().await?;
    println!("  fixed core: {:?}, {:?}", first.kind(), second.kind());

    let extra = pool.acquire().await?;
    println!(
        "  beyond the core: {:?}, overflow left: {}",
        extra.kind(),
        pool.overflow_remaining()
    );

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    println!("  saturated pool is waiting: {}", !waiter.is_finished());

    pool.release(first).await?;
    let unblocked = waiter.await.map_err(|_| elastic_connpool::PoolError::Cancelled)??;
    println!("  after a release the waiter got: {:?}", unblocked.kind());

    for conn in [second, extra, unblocked] {
        pool.release(conn).await?;
    }

    println!("  health: {:?}", pool.get_health_status().warnings);
    pool.destroy().await;
    println!("  connected after destroy: {}", pool.is_connected());
    Ok(())
}
