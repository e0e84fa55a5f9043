//! Wires the three primitives together: a pool drains work onto a shared
//! cache while a coroutine engine interleaves a couple of routines on the
//! main thread. Pool sizing is sourced from the environment the same way
//! `SchedulerConfig::from_env` does it in the scheduler this crate grew
//! out of.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use coroutine::Engine;
use lru_cache::Cache;
use worker_pool::{Submission, WorkerPool};

fn main() {
    println!("=== rt-demo ===\n");

    println!("--- worker-pool ---");
    let low: usize = rt_core::env_get("RT_DEMO_POOL_LOW", 2);
    let high: usize = rt_core::env_get("RT_DEMO_POOL_HIGH", 4);
    let queue: usize = rt_core::env_get("RT_DEMO_POOL_QUEUE", 64);
    let idle_ms: u64 = rt_core::env_get("RT_DEMO_POOL_IDLE_MS", 200);

    let pool = WorkerPool::new(low, high, queue, Duration::from_millis(idle_ms));
    let cache = Arc::new(Mutex::new(Cache::new(4096)));

    for i in 0..20 {
        let cache = Arc::clone(&cache);
        let submission = pool.execute(move || {
            let key = format!("item-{i}");
            let value = format!("value-{i}");
            cache.lock().unwrap().put(key, value);
        });
        if submission == Submission::Rejected {
            println!("task {i} rejected (queue full)");
        }
    }
    pool.stop(true);
    println!(
        "cache now holds {} entries, {} bytes\n",
        cache.lock().unwrap().len(),
        cache.lock().unwrap().actual_size()
    );

    println!("--- coroutine ---");
    let engine = Engine::new();

    let e1 = engine.clone();
    engine.spawn(move || {
        for i in 0..3 {
            println!("[routine 1] iteration {i}");
            e1.yield_now();
        }
        println!("[routine 1] done");
    });

    let e2 = engine.clone();
    engine.spawn(move || {
        for i in 0..3 {
            println!("[routine 2] iteration {i}");
            e2.yield_now();
        }
        println!("[routine 2] done");
    });

    while engine.alive_count() > 0 {
        engine.yield_now();
    }

    println!("\n=== done ===");
}
