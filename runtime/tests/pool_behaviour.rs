// Copyright 2026 Marketlens Contributors
// SPDX-License-Identifier: Apache-2.0

//! Browser pool lifecycle against an in-process engine.

mod common;

use common::FakeLauncher;
use marketlens_runtime::events::{EventBus, ExtractionEvent, PoolOp};
use marketlens_runtime::pool::{BrowserPool, PoolConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn config(capacity: usize, recycle_threshold: u32) -> PoolConfig {
    PoolConfig {
        capacity,
        recycle_threshold,
        acquire_timeout: Duration::from_secs(5),
        probe_timeout: Duration::from_secs(2),
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test]
async fn test_saturated_pool_hands_the_released_handle_to_the_waiter() {
    let launcher = Arc::new(FakeLauncher::default());
    let pool = BrowserPool::new(launcher.clone(), config(3, 50));

    let a = pool.acquire().await.unwrap();
    let b = pool.acquire().await.unwrap();
    let c = pool.acquire().await.unwrap();
    assert_eq!(pool.stats().in_use_count, 3);

    let waiter = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.acquire().await })
    };
    settle().await;
    assert!(!waiter.is_finished(), "fourth acquire must block at capacity");

    let released_id = b.id().to_string();
    pool.release(b).await;

    let d = waiter.await.unwrap().unwrap();
    assert_eq!(d.id(), released_id);
    assert_eq!(launcher.launches(), 3);
    assert_eq!(pool.stats().in_use_count, 3);

    for lease in [a, c, d] {
        pool.release(lease).await;
    }
    assert_eq!(pool.stats().available, 3);
}

#[tokio::test]
async fn test_in_use_never_exceeds_capacity_under_contention() {
    let launcher = Arc::new(FakeLauncher::default());
    let pool = BrowserPool::new(launcher.clone(), config(3, 1_000));
    let peak = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..12)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let peak = Arc::clone(&peak);
            tokio::spawn(async move {
                let lease = pool.acquire().await.unwrap();
                peak.fetch_max(pool.stats().in_use_count, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                pool.release(lease).await;
            })
        })
        .collect();
    for t in tasks {
        t.await.unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert!(launcher.launches() <= 3);
    assert_eq!(pool.stats().in_use_count, 0);
}

#[tokio::test]
async fn test_handle_is_recycled_at_threshold() {
    let launcher = Arc::new(FakeLauncher::default());
    let pool = BrowserPool::new(launcher.clone(), config(1, 2));

    let lease = pool.acquire().await.unwrap();
    let first = lease.id().to_string();
    pool.release(lease).await;

    let lease = pool.acquire().await.unwrap();
    assert_eq!(lease.id(), first);
    pool.release(lease).await; // second request: threshold reached

    let lease = pool.acquire().await.unwrap();
    assert_ne!(lease.id(), first);
    assert_eq!(lease.handle().request_count(), 0);
    assert_eq!(launcher.launches(), 2);
    assert_eq!(launcher.engine(0).shutdowns.load(Ordering::SeqCst), 1);
    pool.release(lease).await;
}

#[tokio::test]
async fn test_dead_handle_is_replaced_transparently() {
    let launcher = Arc::new(FakeLauncher::default());
    let pool = BrowserPool::new(launcher.clone(), config(2, 50));

    let lease = pool.acquire().await.unwrap();
    let first = lease.id().to_string();
    pool.release(lease).await;

    launcher.engine(0).kill();
    let lease = pool.acquire().await.unwrap();
    assert_ne!(lease.id(), first);
    assert_eq!(launcher.launches(), 2);
    assert_eq!(pool.stats().pool_size, 1);
    pool.release(lease).await;
}

#[tokio::test]
async fn test_release_of_dead_handle_retires_it() {
    let launcher = Arc::new(FakeLauncher::default());
    let pool = BrowserPool::new(launcher.clone(), config(2, 50));

    let lease = pool.acquire().await.unwrap();
    launcher.engine(0).kill();
    pool.release(lease).await;
    assert_eq!(pool.stats().pool_size, 0);
}

#[tokio::test]
async fn test_close_all_is_idempotent() {
    let launcher = Arc::new(FakeLauncher::default());
    let pool = BrowserPool::new(launcher.clone(), config(3, 50));

    let held = pool.acquire().await.unwrap();
    let idle = pool.acquire().await.unwrap();
    pool.release(idle).await;

    pool.close_all().await;
    let stats = pool.stats();
    assert!(stats.closed);
    assert_eq!(stats.pool_size, 0);

    pool.close_all().await;
    assert_eq!(pool.stats().pool_size, 0);

    for n in 0..launcher.launches() {
        assert!(!launcher.engine(n).alive.load(Ordering::SeqCst));
    }

    // Returning a lease after shutdown neither fails nor re-adds it.
    pool.release(held).await;
    assert_eq!(pool.stats().pool_size, 0);
}

#[tokio::test]
async fn test_dropped_lease_is_released() {
    let launcher = Arc::new(FakeLauncher::default());
    let pool = BrowserPool::new(launcher.clone(), config(1, 50));

    let lease = pool.acquire().await.unwrap();
    drop(lease);
    settle().await;

    let stats = pool.stats();
    assert_eq!(stats.in_use_count, 0);
    assert_eq!(stats.available, 1);
}

#[tokio::test]
async fn test_timed_out_holder_does_not_leak_handle() {
    let launcher = Arc::new(FakeLauncher::default());
    let pool = BrowserPool::new(launcher.clone(), config(1, 50));

    let holder = {
        let pool = Arc::clone(&pool);
        async move {
            let _lease = pool.acquire().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
    };
    assert!(tokio::time::timeout(Duration::from_millis(20), holder)
        .await
        .is_err());
    settle().await;

    // Capacity 1: this only succeeds if the timed-out lease came back.
    let lease = tokio::time::timeout(Duration::from_secs(1), pool.acquire())
        .await
        .expect("handle returned to pool")
        .unwrap();
    assert_eq!(launcher.launches(), 1);
    pool.release(lease).await;
}

#[tokio::test]
async fn test_acquire_cancelled_during_probe_keeps_capacity() {
    let launcher = Arc::new(FakeLauncher::with_probe_delay(Duration::from_secs(60)));
    let pool = BrowserPool::new(launcher.clone(), config(1, 50));

    // Launching skips the probe; releasing runs one, which hangs until the
    // probe timeout and retires the engine. Put it back without probing.
    let lease = pool.acquire().await.unwrap();
    drop(lease);
    assert_eq!(pool.stats().available, 1);

    let cancelled = tokio::time::timeout(Duration::from_millis(50), pool.acquire()).await;
    assert!(cancelled.is_err(), "probe of a hung engine outlives the caller");

    let stats = pool.stats();
    assert_eq!(stats.in_use_count, 0);
    assert_eq!(stats.pool_size, 1);

    let _ = tokio::time::timeout(Duration::from_millis(50), pool.acquire()).await;
    assert!(pool.stats().pool_size <= 1);
    assert!(launcher.live_engines() <= 1);
    assert_eq!(launcher.launches(), 1);
}

#[tokio::test]
async fn test_release_cancelled_during_probe_keeps_capacity() {
    let launcher = Arc::new(FakeLauncher::with_probe_delay(Duration::from_secs(60)));
    let pool = BrowserPool::new(launcher.clone(), config(1, 50));

    let lease = pool.acquire().await.unwrap();
    let cancelled = tokio::time::timeout(Duration::from_millis(50), pool.release(lease)).await;
    assert!(cancelled.is_err());

    let stats = pool.stats();
    assert_eq!(stats.in_use_count, 0);
    assert_eq!(stats.pool_size, 1);
    assert_eq!(stats.available, 1);

    let _ = tokio::time::timeout(Duration::from_millis(50), pool.acquire()).await;
    assert!(pool.stats().in_use_count <= 1);
    assert!(launcher.live_engines() <= 1);
    assert_eq!(launcher.launches(), 1);
}

#[tokio::test]
async fn test_hung_engine_is_replaced_after_probe_timeout() {
    let launcher = Arc::new(FakeLauncher::with_probe_delay(Duration::from_secs(60)));
    let pool = BrowserPool::new(
        launcher.clone(),
        PoolConfig {
            probe_timeout: Duration::from_millis(50),
            ..config(1, 50)
        },
    );

    let lease = pool.acquire().await.unwrap();
    let first = lease.id().to_string();
    drop(lease);

    let lease = pool.acquire().await.unwrap();
    assert_ne!(lease.id(), first);
    assert_eq!(launcher.launches(), 2);
    assert_eq!(launcher.engine(0).shutdowns.load(Ordering::SeqCst), 1);
    assert_eq!(launcher.live_engines(), 1);
    assert_eq!(pool.stats().pool_size, 1);
}

#[tokio::test]
async fn test_retired_engine_is_gone_before_waiter_launches() {
    let launcher = Arc::new(FakeLauncher::default());
    let pool = BrowserPool::new(launcher.clone(), config(1, 1));

    let lease = pool.acquire().await.unwrap();
    let waiter = {
        let pool = Arc::clone(&pool);
        let launcher = Arc::clone(&launcher);
        tokio::spawn(async move {
            let lease = pool.acquire().await.unwrap();
            // The recycled engine was shut down before this permit existed.
            let live = launcher.live_engines();
            pool.release(lease).await;
            live
        })
    };
    settle().await;
    pool.release(lease).await;

    assert_eq!(waiter.await.unwrap(), 1);
    assert_eq!(launcher.launches(), 2);
}

#[tokio::test]
async fn test_pool_events() {
    let events = EventBus::default();
    let mut rx = events.subscribe();
    let pool = BrowserPool::with_events(Arc::new(FakeLauncher::default()), config(2, 50), events);

    let lease = pool.acquire().await.unwrap();
    pool.release(lease).await;
    let lease = pool.acquire().await.unwrap();
    pool.discard(lease).await;

    let mut ops = Vec::new();
    while let Ok(ExtractionEvent::Pool {
        event,
        pool_size,
        in_use_count,
        ..
    }) = rx.try_recv()
    {
        assert!(in_use_count <= pool_size);
        ops.push(event);
    }
    assert_eq!(
        ops,
        vec![
            PoolOp::Create,
            PoolOp::Acquire,
            PoolOp::Release,
            PoolOp::Acquire,
            PoolOp::Discard,
        ]
    );
}
