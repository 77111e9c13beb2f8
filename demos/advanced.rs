//! Advanced features: backend settings, parking, latch policy, Prometheus, destroy

use elastic_connpool::memory::MemoryBackend;
use elastic_connpool::{BackendConfig, ElasticPool, ExhaustionPolicy, PoolConfiguration, PoolError};
use std::collections::HashMap;
use std::time::Duration;

#[tokio::main]
async fn main() {
    println!("=== Elastic connection pool - Advanced Features ===\n");

    // Example 1: Building the URI from backend settings
    backend_settings();

    // Example 2: Late core connections get parked
    parking().await;

    // Example 3: Sticky exhaustion latch
    sticky_latch().await;

    // Example 4: Prometheus metrics
    prometheus_export().await;

    // Example 5: Destroy
    destroy().await;
}

fn backend_settings() {
    println!("1. Backend Settings:");
    let config = BackendConfig::new("localhost:7687")
        .with_credentials("neo4j", "p@ss word")
        .with_sizes(50, 100);

    println!("   {:?}", config);
    println!("   URI: {}\n", config.uri());
}

async fn parking() {
    println!("2. Parking:");
    let backend = MemoryBackend::new();
    let config = PoolConfiguration::new("mem://advanced")
        .with_fixed_size(1)
        .with_max_size(2)
        .with_fast_path_timeout(Duration::from_millis(2));
    let pool = ElasticPool::new(backend.clone(), config).await.unwrap();

    // A slow core loses the race; its connection arrives later
    backend.set_acquire_delay(Duration::from_millis(20));
    let overflow = pool.acquire().await.unwrap();
    println!("   Slow core, got {:?}", overflow.kind());

    tokio::time::sleep(Duration::from_millis(50)).await;
    println!("   Parked connections: {}", pool.parked_count());

    let parked = pool.acquire().await.unwrap();
    println!("   Next caller got the parked {:?} connection\n", parked.kind());

    parked.release().await.unwrap();
    overflow.release().await.unwrap();
}

async fn sticky_latch() {
    println!("3. Sticky Latch:");
    let config = PoolConfiguration::new("mem://advanced")
        .with_fixed_size(1)
        .with_max_size(3)
        .with_fast_path_timeout(Duration::from_millis(5))
        .with_exhaustion_policy(ExhaustionPolicy::Sticky);
    let pool = ElasticPool::new(MemoryBackend::new(), config).await.unwrap();

    let first = pool.acquire().await.unwrap();
    let second = pool.acquire().await.unwrap();
    first.release().await.unwrap();
    second.release().await.unwrap();
    println!("   Exhausted after releasing everything: {}\n", pool.is_exhausted());
}

async fn prometheus_export() {
    println!("4. Prometheus Metrics Export:");
    let config = PoolConfiguration::new("mem://advanced").with_fixed_size(2).with_max_size(4);
    let pool = ElasticPool::new(MemoryBackend::new(), config).await.unwrap();

    let conn = pool.acquire().await.unwrap();

    let mut tags = HashMap::new();
    tags.insert("service".to_string(), "example".to_string());
    tags.insert("env".to_string(), "dev".to_string());

    match pool.export_metrics_prometheus("example_pool", Some(&tags)) {
        Ok(text) => println!("{}", text),
        Err(e) => println!("   Error: {}", e),
    }
    conn.release().await.unwrap();
}

async fn destroy() {
    println!("5. Destroy:");
    let backend = MemoryBackend::new();
    let config = PoolConfiguration::new("mem://advanced").with_fixed_size(3).with_max_size(3);
    let pool = ElasticPool::new(backend.clone(), config).await.unwrap();

    let conn = pool.acquire().await.unwrap();
    conn.release().await.unwrap();

    pool.destroy().await;
    println!("   Drained: {}", pool.get_metrics().drained_connections);
    println!("   Expired by the backend: {}", backend.stats().expired());

    match pool.acquire().await {
        Err(PoolError::PoolClosed) => println!("   Acquire after destroy: pool closed"),
        other => println!("   Unexpected: {:?}", other.map(|c| c.kind())),
    }
}
