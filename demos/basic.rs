//! Basic usage examples for ElasticPool

use elastic_connpool::memory::MemoryBackend;
use elastic_connpool::{ElasticPool, PoolConfiguration};
use std::time::Duration;

#[tokio::main]
async fn main() {
    println!("=== Elastic connection pool - Basic Examples ===\n");

    // Example 1: Acquire and release
    acquire_and_release().await;

    // Example 2: Overflow beyond the fixed core
    overflow().await;

    // Example 3: Metrics and health
    metrics_and_health().await;
}

fn demo_config(fixed: usize, max: usize) -> PoolConfiguration {
    PoolConfiguration::new("mem://basic")
        .with_fixed_size(fixed)
        .with_max_size(max)
        .with_fast_path_timeout(Duration::from_millis(5))
}

async fn acquire_and_release() {
    println!("1. Acquire and Release:");
    let pool = ElasticPool::new(MemoryBackend::new(), demo_config(2, 2)).await.unwrap();

    let mut conn = pool.acquire().await.unwrap();
    let queries = conn.execute("RETURN 1").await.unwrap();
    println!("   Got {:?} connection {}, ran {} query", conn.kind(), conn.id(), queries);
    pool.release(conn).await.unwrap();

    let again = pool.acquire().await.unwrap();
    println!("   Reused connection {} after release\n", again.id());
    again.release().await.unwrap();
}

async fn overflow() {
    println!("2. Overflow:");
    let pool = ElasticPool::new(MemoryBackend::new(), demo_config(1, 3)).await.unwrap();

    let mut held = Vec::new();
    for _ in 0..3 {
        let conn = pool.acquire().await.unwrap();
        println!(
            "   Acquired {:?}, overflow left: {}",
            conn.kind(),
            pool.overflow_remaining()
        );
        held.push(conn);
    }

    for conn in held {
        pool.release(conn).await.unwrap();
    }
    println!("   Overflow left after release: {}\n", pool.overflow_remaining());
}

async fn metrics_and_health() {
    println!("3. Metrics and Health:");
    let pool = ElasticPool::new(MemoryBackend::new(), demo_config(2, 4)).await.unwrap();

    let first = pool.acquire().await.unwrap();
    let second = pool.acquire().await.unwrap();

    let health = pool.get_health_status();
    println!("   Health: {}", if health.is_healthy { "Healthy" } else { "Unhealthy" });
    println!("   Utilization: {:.1}%", health.utilization * 100.0);

    first.release().await.unwrap();
    second.release().await.unwrap();

    let metrics = pool.export_metrics();
    println!("\n   Metrics:");
    for (key, value) in metrics {
        println!("     {}: {}", key, value);
    }
}
