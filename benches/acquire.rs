use criterion::{Criterion, criterion_group, criterion_main};
use elastic_connpool::memory::MemoryBackend;
use elastic_connpool::{ElasticPool, PoolConfiguration};
use std::time::Duration;

fn fast_path(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let config = PoolConfiguration::new("mem://bench")
        .with_fixed_size(8)
        .with_max_size(16)
        .with_fast_path_timeout(Duration::from_millis(5));
    let pool = runtime
        .block_on(ElasticPool::new(MemoryBackend::new(), config))
        .unwrap();

    c.bench_function("acquire_release_fast_path", |b| {
        b.to_async(&runtime).iter(|| async {
            let conn = pool.acquire().await.unwrap();
            conn.release().await.unwrap();
        })
    });

    c.bench_function("acquire_release_parallel_8", |b| {
        b.to_async(&runtime).iter(|| async {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let pool = pool.clone();
                    tokio::spawn(async move {
                        let conn = pool.acquire().await.unwrap();
                        conn.release().await.unwrap();
                    })
                })
                .collect();
            for handle in handles {
                handle.await.unwrap();
            }
        })
    });

    runtime.block_on(pool.destroy());
}

criterion_group!(benches, fast_path);
criterion_main!(benches);
