use elastic_connpool::memory::MemoryBackend;
use elastic_connpool::{ConnectionKind, ElasticPool, PoolConfiguration, PoolError};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

const FAST_PATH: Duration = Duration::from_millis(50);

fn config(fixed: usize, max: usize) -> PoolConfiguration {
    PoolConfiguration::new("mem://integration")
        .with_fixed_size(fixed)
        .with_max_size(max)
        .with_fast_path_timeout(FAST_PATH)
        .with_drain_window(Duration::from_millis(20))
}

async fn pool(fixed: usize, max: usize) -> (ElasticPool<MemoryBackend>, MemoryBackend) {
    let backend = MemoryBackend::new();
    let pool = ElasticPool::new(backend.clone(), config(fixed, max)).await.unwrap();
    (pool, backend)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_acquires_within_fixed_size_take_fast_path() {
    let (pool, _) = pool(4, 6).await;

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move {
                let started = Instant::now();
                let conn = pool.acquire().await.unwrap();
                (conn, started.elapsed())
            })
        })
        .collect();

    let mut held = Vec::new();
    for handle in handles {
        let (conn, elapsed) = handle.await.unwrap();
        assert!(conn.is_pooled());
        assert!(elapsed < FAST_PATH, "fast path took {:?}", elapsed);
        held.push(conn);
    }

    assert!(!pool.is_exhausted());
    assert_eq!(pool.overflow_remaining(), 2);
    for conn in held {
        conn.release().await.unwrap();
    }
}

#[tokio::test]
async fn test_overflow_beyond_fixed_size() {
    let (pool, backend) = pool(2, 5).await;

    let mut held = Vec::new();
    for _ in 0..2 {
        let conn = pool.acquire().await.unwrap();
        assert_eq!(conn.kind(), ConnectionKind::Pooled);
        held.push(conn);
    }
    for expected_left in [2, 1, 0] {
        let conn = pool.acquire().await.unwrap();
        assert_eq!(conn.kind(), ConnectionKind::Overflow);
        assert_eq!(pool.overflow_remaining(), expected_left);
        held.push(conn);
    }

    assert_eq!(backend.stats().adhoc_created(), 3);
    assert_eq!(pool.get_metrics().overflow_in_use, 3);

    for conn in held {
        pool.release(conn).await.unwrap();
    }
    assert_eq!(pool.overflow_remaining(), 3);
}

#[tokio::test]
async fn test_saturated_pool_blocks_instead_of_failing() {
    let (pool, _) = pool(1, 2).await;

    let pooled = pool.acquire().await.unwrap();
    let overflow = pool.acquire().await.unwrap();
    assert!(!overflow.is_pooled());

    let blocked = tokio::time::timeout(Duration::from_millis(150), pool.acquire()).await;
    assert!(blocked.is_err(), "acquire on a saturated pool must wait");
    assert_eq!(pool.overflow_remaining(), 0);

    pooled.release().await.unwrap();
    let next = tokio::time::timeout(Duration::from_secs(2), pool.acquire())
        .await
        .expect("a freed core slot must end the wait")
        .unwrap();
    assert!(next.is_pooled());

    next.release().await.unwrap();
    overflow.release().await.unwrap();
}

#[tokio::test]
async fn test_release_unblocks_waiter_with_pooled_connection() {
    // fixed 2, max 3: two pooled, one overflow, the fourth waits
    let (pool, _) = pool(2, 3).await;

    let first = pool.acquire().await.unwrap();
    let second = pool.acquire().await.unwrap();
    assert!(first.is_pooled() && second.is_pooled());

    let third = pool.acquire().await.unwrap();
    assert_eq!(third.kind(), ConnectionKind::Overflow);
    assert_eq!(pool.overflow_remaining(), 0);

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!waiter.is_finished());

    pool.release(first).await.unwrap();
    let fourth = tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .expect("waiter was not woken by the release")
        .unwrap()
        .unwrap();
    assert!(fourth.is_pooled());
    // Served either by its own core acquisition or by the parked loser of an
    // earlier race
    let metrics = pool.get_metrics();
    assert_eq!(metrics.total_blocking_acquired + metrics.parked_reused, 1);

    for conn in [second, third, fourth] {
        conn.release().await.unwrap();
    }
    assert_eq!(pool.overflow_remaining(), 1);
}

#[tokio::test]
async fn test_acquire_after_destroy_fails_immediately() {
    let (pool, _) = pool(2, 3).await;
    pool.destroy().await;

    let started = Instant::now();
    let result = pool.acquire().await;
    assert!(matches!(result, Err(PoolError::PoolClosed)));
    assert!(started.elapsed() < Duration::from_millis(10));
    assert!(!pool.is_connected());
}

#[tokio::test]
async fn test_destroy_expires_pooled_connections() {
    let (pool, backend) = pool(3, 3).await;

    let conn = pool.acquire().await.unwrap();
    conn.release().await.unwrap();

    pool.destroy().await;

    let stats = backend.stats();
    assert_eq!(stats.expired(), 3);
    assert_eq!(stats.checked_out(), 0);
    assert_eq!(pool.get_metrics().drained_connections, 3);
    assert!(!pool.get_health_status().is_healthy());
}

#[tokio::test]
async fn test_destroy_is_idempotent() {
    let (pool, backend) = pool(2, 2).await;

    tokio::join!(pool.destroy(), pool.destroy());
    pool.destroy().await;

    assert!(!pool.is_connected());
    assert_eq!(backend.stats().expired(), 2);
}

#[tokio::test]
async fn test_destroy_wakes_blocked_waiter() {
    let (pool, _) = pool(1, 1).await;
    let held = pool.acquire().await.unwrap();

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!waiter.is_finished());

    pool.destroy().await;
    let result = tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .expect("destroy did not wake the waiter")
        .unwrap();
    assert!(matches!(result, Err(PoolError::PoolClosed)));
    assert_eq!(pool.get_metrics().total_blocking_acquired, 0);

    held.release().await.unwrap();
}

#[tokio::test]
async fn test_connection_released_after_destroy_stays_open() {
    // Checked-out connections are not tracked by the drain
    let (pool, backend) = pool(2, 2).await;
    let outstanding = pool.acquire().await.unwrap();

    pool.destroy().await;
    assert_eq!(backend.stats().expired(), 1);

    outstanding.release().await.unwrap();
    assert_eq!(backend.stats().returned(), 1);
    assert_eq!(backend.stats().expired(), 1);
}

#[tokio::test]
async fn test_release_after_destroy_swallows_close_errors() {
    let (pool, backend) = pool(1, 2).await;
    let pooled = pool.acquire().await.unwrap();
    let overflow = pool.acquire().await.unwrap();

    pool.destroy().await;
    backend.set_fail_close(true);

    assert!(overflow.release().await.is_ok());
    assert!(pooled.release().await.is_ok());
    assert_eq!(pool.get_metrics().release_errors, 2);
}

#[tokio::test]
async fn test_close_error_on_live_pool_is_surfaced() {
    let (pool, backend) = pool(1, 1).await;
    let conn = pool.acquire().await.unwrap();

    backend.set_fail_close(true);
    assert!(matches!(
        conn.release().await,
        Err(PoolError::BackendUnavailable(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overflow_conservation_under_stress() {
    const FIXED: usize = 3;
    const MAX: usize = 6;
    const CEILING: usize = MAX - FIXED;

    let backend = MemoryBackend::new();
    let cfg = config(FIXED, MAX).with_fast_path_timeout(Duration::from_millis(2));
    let pool = ElasticPool::new(backend, cfg).await.unwrap();

    let pooled_out = Arc::new(AtomicUsize::new(0));
    let overflow_out = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..24)
        .map(|task| {
            let pool = pool.clone();
            let pooled_out = Arc::clone(&pooled_out);
            let overflow_out = Arc::clone(&overflow_out);
            tokio::spawn(async move {
                for round in 0..20 {
                    let conn = pool.acquire().await.unwrap();
                    let counter = if conn.is_pooled() { &pooled_out } else { &overflow_out };
                    counter.fetch_add(1, Ordering::SeqCst);

                    assert!(pooled_out.load(Ordering::SeqCst) <= FIXED);
                    assert!(overflow_out.load(Ordering::SeqCst) <= CEILING);

                    if (task + round) % 3 == 0 {
                        tokio::time::sleep(Duration::from_millis(1)).await;
                    } else {
                        tokio::task::yield_now().await;
                    }

                    counter.fetch_sub(1, Ordering::SeqCst);
                    conn.release().await.unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap();
    }

    let metrics = pool.get_metrics();
    assert_eq!(pool.overflow_remaining(), CEILING);
    assert_eq!(metrics.overflow_in_use, 0);
    assert_eq!(metrics.pooled_in_use, 0);
    assert_eq!(
        metrics.total_pooled_acquired + metrics.total_overflow_acquired,
        24 * 20
    );

    pool.destroy().await;
}
