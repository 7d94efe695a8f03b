#![allow(clippy::unwrap_used, clippy::expect_used, clippy::cast_possible_wrap, clippy::semicolon_if_nothing_returned)]
//! Pool and cache benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use memopool::cache::ResultCache;
use memopool::executor::local::Registry;
use memopool::fingerprint::Fingerprint;
use memopool::task::CallableRef;
use memopool::Pool;
use serde_json::{json, Value};

fn registry() -> Registry {
    let mut registry = Registry::new();
    registry.register("fib", |args: &[Value]| {
        let n = args.first().and_then(Value::as_u64).unwrap_or(0);
        let (mut a, mut b) = (0_u64, 1_u64);
        for _ in 0..n {
            (a, b) = (b, a.wrapping_add(b));
        }
        Ok(json!(a))
    });
    registry
}

/// Benchmark task submission throughput with caching off
fn bench_pool_submit_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_submit_throughput");
    let rt = tokio::runtime::Runtime::new().unwrap();

    for num_tasks in [10_usize, 100, 1_000] {
        group.throughput(Throughput::Elements(num_tasks as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(num_tasks),
            &num_tasks,
            |b, &num_tasks| {
                b.iter(|| {
                    rt.block_on(async {
                        let pool = Pool::builder()
                            .workers(4)
                            .caching(false)
                            .registry(registry())
                            .build()
                            .unwrap();

                        let handles: Vec<_> = (0..num_tasks)
                            .map(|i| pool.submit("fib", vec![black_box(json!(i % 90))]))
                            .collect();

                        for handle in handles {
                            let _ = handle.await;
                        }

                        pool.shutdown().await;
                    })
                });
            },
        );
    }
    group.finish();
}

/// Benchmark submissions answered from the cache
fn bench_pool_cache_hits(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let pool = rt.block_on(async {
        let pool = Pool::builder()
            .workers(2)
            .registry(registry())
            .build()
            .unwrap();
        pool.submit("fib", vec![json!(80)]).await.unwrap();
        pool
    });

    c.bench_function("pool_cache_hit", |b| {
        b.iter(|| rt.block_on(pool.submit("fib", vec![black_box(json!(80))])).unwrap())
    });
}

/// Benchmark raw LRU operations
fn bench_result_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("result_cache");

    for capacity in [100_usize, 10_000] {
        group.bench_with_input(BenchmarkId::new("put_evicting", capacity), &capacity, |b, &capacity| {
            let mut cache = ResultCache::new(capacity);
            let mut next = 0_u64;
            b.iter(|| {
                next += 1;
                cache.put(black_box(next), next);
            });
        });

        group.bench_with_input(BenchmarkId::new("get_hit", capacity), &capacity, |b, &capacity| {
            let mut cache = ResultCache::new(capacity);
            for k in 0..capacity as u64 {
                cache.put(k, k);
            }
            let mut next = 0_u64;
            b.iter(|| {
                next = (next + 1) % capacity as u64;
                black_box(cache.get(&next).copied())
            });
        });
    }
    group.finish();
}

/// Benchmark fingerprinting of nested arguments
fn bench_fingerprint(c: &mut Criterion) {
    let callable = CallableRef::new("transform");
    let args = vec![
        json!({"matrix": [[1, 2, 3], [4, 5, 6]], "scale": 2.5, "label": "m"}),
        json!((0..64).collect::<Vec<i32>>()),
    ];

    c.bench_function("fingerprint_nested", |b| {
        b.iter(|| Fingerprint::of(black_box(&callable), black_box(&args)))
    });
}

criterion_group!(
    benches,
    bench_pool_submit_throughput,
    bench_pool_cache_hits,
    bench_result_cache,
    bench_fingerprint
);
criterion_main!(benches);
