#![allow(clippy::all, clippy::pedantic, clippy::nursery)]
//! Memoized Fibonacci Example
//!
//! Demonstrates queueing, result memoization and crash recovery.
//! Run with `RUST_LOG=memopool=debug` to watch the pool's bookkeeping.

use memopool::error::PoolError;
use memopool::executor::local::Registry;
use memopool::Pool;
use serde_json::{json, Value};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn fib(n: u64) -> u64 {
    if n < 2 {
        n
    } else {
        fib(n - 1) + fib(n - 2)
    }
}

#[tokio::main]
async fn main() -> memopool::error::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut registry = Registry::new();
    registry
        .register("fib", |args: &[Value]| {
            let n = args
                .first()
                .and_then(Value::as_u64)
                .ok_or_else(|| PoolError::execution("fib expects a non-negative integer"))?;
            Ok(json!(fib(n)))
        })
        .register("flaky", |_: &[Value]| panic!("simulated worker crash"));

    let pool = Pool::builder()
        .workers(2)
        .cache_capacity(16)
        .registry(registry)
        .build()?;

    println!("Pool initialized with {} workers\n", pool.capacity());

    // Example 1: more tasks than workers, the rest queue
    let start = Instant::now();
    let handles: Vec<_> = (30..36).map(|n| pool.submit("fib", vec![json!(n)])).collect();
    println!("Queued behind busy workers: {}", pool.pending_tasks());
    for (n, handle) in (30..36).zip(handles) {
        println!("  fib({n}) = {}", handle.await?);
    }
    println!("Cold run took {:?}\n", start.elapsed());

    // Example 2: the same calls again come from the cache
    let start = Instant::now();
    for n in 30..36 {
        pool.submit("fib", vec![json!(n)]).await?;
    }
    println!("Warm run took {:?}\n", start.elapsed());

    // Example 3: a crashing task fails alone and its worker is replaced
    match pool.submit("flaky", vec![]).await {
        Ok(v) => println!("Unexpected success: {v}"),
        Err(e) => println!("flaky failed: {e}"),
    }
    println!("fib(20) after crash = {}\n", pool.submit("fib", vec![json!(20)]).await?);

    let stats = pool.stats();
    println!(
        "Stats: {} workers, {} hits, {} misses, {} replacements",
        stats.live_workers, stats.cache_hits, stats.cache_misses, stats.replacements
    );

    pool.shutdown().await;
    Ok(())
}
