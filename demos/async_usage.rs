//! Concurrent usage examples

use elastic_connpool::memory::MemoryBackend;
use elastic_connpool::{ElasticPool, PoolConfiguration};
use std::time::Duration;
use tokio::time::sleep;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    println!("=== Elastic connection pool - Async Examples ===\n");

    // Example 1: Scoped work with with_connection
    scoped_work().await;

    // Example 2: Many tasks sharing one pool
    concurrent_access().await;

    // Example 3: Waiting on a saturated pool
    saturated_pool().await;
}

async fn scoped_work() {
    println!("1. Scoped Work:");
    let config = PoolConfiguration::new("mem://async").with_fixed_size(1).with_max_size(1);
    let pool = ElasticPool::new(MemoryBackend::new(), config).await.unwrap();

    let ran = pool
        .with_connection(|conn| {
            Box::pin(async move {
                conn.execute("CREATE (a:Test {name: 'Arthur'})").await?;
                conn.execute("MATCH (a:Test) DELETE a").await
            })
        })
        .await
        .unwrap();
    println!("   Ran {} statements, connection released\n", ran);
}

async fn concurrent_access() {
    println!("2. Concurrent Access:");
    let config = PoolConfiguration::new("mem://async")
        .with_fixed_size(3)
        .with_max_size(5)
        .with_fast_path_timeout(Duration::from_millis(5));
    let pool = ElasticPool::new(MemoryBackend::new(), config).await.unwrap();

    let mut handles = vec![];
    for i in 0..10 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            let conn = pool.acquire().await.unwrap();
            println!("   Task {} got {:?} connection", i, conn.kind());
            sleep(Duration::from_millis(20)).await;
            conn.release().await.unwrap();
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    let metrics = pool.get_metrics();
    println!(
        "   pooled: {}, overflow: {}, waited: {}\n",
        metrics.total_pooled_acquired,
        metrics.total_overflow_acquired,
        metrics.total_blocking_acquired
    );
}

async fn saturated_pool() {
    println!("3. Saturated Pool:");
    let config = PoolConfiguration::new("mem://async")
        .with_fixed_size(1)
        .with_max_size(1)
        .with_fast_path_timeout(Duration::from_millis(5));
    let pool = ElasticPool::new(MemoryBackend::new(), config).await.unwrap();

    let held = pool.acquire().await.unwrap();
    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await })
    };

    sleep(Duration::from_millis(50)).await;
    println!("   Waiter still blocked: {}", !waiter.is_finished());

    held.release().await.unwrap();
    let conn = waiter.await.unwrap().unwrap();
    println!("   Waiter unblocked with a {:?} connection", conn.kind());
    conn.release().await.unwrap();
}
