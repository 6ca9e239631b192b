// Copyright 2026 Marketlens Contributors
// SPDX-License-Identifier: Apache-2.0

//! Bounded pool of reusable browser engines.
//!
//! A fair semaphore with `capacity` permits gates acquisition, so at most
//! `capacity` handles are ever leased and waiters are served in FIFO order.
//! Released handles go back to the front of the `available` queue before
//! the permit is returned, which hands the next waiter that exact handle.
//!
//! Handles are retired ("recycled") once they have served
//! `recycle_threshold` requests, and replaced transparently when a
//! liveness probe finds them dead.

use crate::config::ExtractionConfig;
use crate::error::PoolError;
use crate::events::{EventBus, ExtractionEvent, PoolOp};
use crate::renderer::{Launcher, Renderer};
use crate::stealth::StealthProfile;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub capacity: usize,
    pub recycle_threshold: u32,
    pub acquire_timeout: Duration,
    /// Upper bound on a single liveness probe.
    pub probe_timeout: Duration,
}

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

impl From<&ExtractionConfig> for PoolConfig {
    fn from(config: &ExtractionConfig) -> Self {
        Self {
            capacity: config.pool_capacity.max(1),
            recycle_threshold: config.recycle_threshold.max(1),
            acquire_timeout: config.acquire_timeout(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::from(&ExtractionConfig::default())
    }
}

/// One pooled browser engine.
#[derive(Clone)]
pub struct BrowserHandle {
    id: String,
    created_at: DateTime<Utc>,
    request_count: u32,
    alive: bool,
    renderer: Arc<dyn Renderer>,
}

impl BrowserHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Requests served since creation, counting completed leases only.
    pub fn request_count(&self) -> u32 {
        self.request_count
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn renderer(&self) -> &Arc<dyn Renderer> {
        &self.renderer
    }
}

impl std::fmt::Debug for BrowserHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserHandle")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("request_count", &self.request_count)
            .field("alive", &self.alive)
            .finish()
    }
}

/// Point-in-time view of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub capacity: usize,
    /// Handles that exist: available plus in use.
    pub pool_size: usize,
    pub available: usize,
    pub in_use_count: usize,
    pub closed: bool,
}

#[derive(Default)]
struct PoolState {
    available: VecDeque<BrowserHandle>,
    in_use: HashSet<String>,
    /// Every live engine by handle id, including leased ones, so shutdown
    /// can reach handles it does not currently hold.
    engines: HashMap<String, Arc<dyn Renderer>>,
    closed: bool,
}

impl PoolState {
    fn pool_size(&self) -> usize {
        self.available.len() + self.in_use.len()
    }
}

pub struct BrowserPool {
    config: PoolConfig,
    launcher: Arc<dyn Launcher>,
    state: Mutex<PoolState>,
    permits: Arc<Semaphore>,
    next_id: AtomicU64,
    events: Option<EventBus>,
}

impl BrowserPool {
    pub fn new(launcher: Arc<dyn Launcher>, config: PoolConfig) -> Arc<Self> {
        Self::build(launcher, config, None)
    }

    /// Like [`BrowserPool::new`], reporting every pool operation to `events`.
    pub fn with_events(
        launcher: Arc<dyn Launcher>,
        config: PoolConfig,
        events: EventBus,
    ) -> Arc<Self> {
        Self::build(launcher, config, Some(events))
    }

    fn build(launcher: Arc<dyn Launcher>, config: PoolConfig, events: Option<EventBus>) -> Arc<Self> {
        Arc::new(Self {
            config,
            launcher,
            state: Mutex::new(PoolState::default()),
            permits: Arc::new(Semaphore::new(config.capacity)),
            next_id: AtomicU64::new(0),
            events,
        })
    }

    pub fn config(&self) -> PoolConfig {
        self.config
    }

    pub fn stats(&self) -> PoolStats {
        let st = self.lock();
        PoolStats {
            capacity: self.config.capacity,
            pool_size: st.pool_size(),
            available: st.available.len(),
            in_use_count: st.in_use.len(),
            closed: st.closed,
        }
    }

    /// Borrow a handle, waiting in FIFO order when every handle is leased.
    ///
    /// Cancellation safe: a candidate handle is wrapped in a lease before
    /// its liveness probe, so dropping this future puts it back.
    pub async fn acquire(self: &Arc<Self>) -> Result<BrowserLease, PoolError> {
        if self.lock().closed {
            return Err(PoolError::Closed);
        }
        if !self.launcher.is_available() {
            return Err(PoolError::Unavailable(
                "no browser engine installed".to_string(),
            ));
        }

        let mut permit = self.wait_for_permit().await?;
        loop {
            let candidate = {
                let mut st = self.lock();
                if st.closed {
                    return Err(PoolError::Closed);
                }
                let handle = st.available.pop_front();
                if let Some(h) = &handle {
                    st.in_use.insert(h.id.clone());
                }
                handle
            };

            let Some(handle) = candidate else {
                let handle = self.launch().await?;
                return Ok(self.lease(handle, permit));
            };

            let mut lease = self.lease(handle, permit);
            if probe(&lease.handle.renderer, self.config.probe_timeout).await {
                self.emit(PoolOp::Acquire, lease.id());
                return Ok(lease);
            }

            warn!(handle = %lease.id(), "pooled browser failed liveness probe, replacing");
            lease.handle.alive = false;
            permit = match lease.settle(true) {
                // The retirement task owns the permit until the engine is
                // gone, so an abandoned acquire cannot overshoot capacity.
                Some(retired) => match tokio::spawn(retired.terminate()).await {
                    Ok(permit) => permit,
                    Err(e) => {
                        debug!(error = %e, "browser retirement task failed");
                        self.wait_for_permit().await?
                    }
                },
                None => self.wait_for_permit().await?,
            };
        }
    }

    /// Return a lease. The handle is retired when it has reached the
    /// recycle threshold or no longer responds.
    pub async fn release(&self, lease: BrowserLease) {
        finish(lease, false).await;
    }

    /// Return a lease and terminate its handle unconditionally.
    pub async fn discard(&self, lease: BrowserLease) {
        finish(lease, true).await;
    }

    /// Terminate every handle, leased or not. Idempotent; never fails on
    /// engines that are already dead.
    pub async fn close_all(&self) {
        let (engines, first_close) = {
            let mut st = self.lock();
            let first_close = !st.closed;
            st.closed = true;
            st.available.clear();
            st.in_use.clear();
            let engines: Vec<_> = st.engines.drain().collect();
            (engines, first_close)
        };
        self.permits.close();

        if first_close {
            info!(handles = engines.len(), "closing browser pool");
        }
        for (id, engine) in engines {
            if let Err(e) = engine.shutdown().await {
                debug!(handle = %id, error = %e, "browser shutdown failed");
            }
        }
    }

    async fn wait_for_permit(&self) -> Result<OwnedSemaphorePermit, PoolError> {
        tokio::time::timeout(
            self.config.acquire_timeout,
            Arc::clone(&self.permits).acquire_owned(),
        )
        .await
        .map_err(|_| PoolError::AcquireTimeout(self.config.acquire_timeout))?
        .map_err(|_| PoolError::Closed)
    }

    async fn launch(&self) -> Result<BrowserHandle, PoolError> {
        let profile = StealthProfile::randomized();
        let result = self.launcher.launch(&profile).await;

        let renderer = result.map_err(|e| PoolError::Launch(format!("{e:#}")))?;
        let mut st = self.lock();
        let id = format!("browser-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);

        if st.closed {
            drop(st);
            let renderer = Arc::clone(&renderer);
            tokio::spawn(async move {
                let _ = renderer.shutdown().await;
            });
            return Err(PoolError::Closed);
        }

        st.in_use.insert(id.clone());
        st.engines.insert(id.clone(), Arc::clone(&renderer));
        drop(st);

        debug!(handle = %id, user_agent = %profile.user_agent, "launched browser");
        self.emit(PoolOp::Create, &id);
        self.emit(PoolOp::Acquire, &id);
        Ok(BrowserHandle {
            id,
            created_at: Utc::now(),
            request_count: 0,
            alive: true,
            renderer,
        })
    }

    fn lease(self: &Arc<Self>, handle: BrowserHandle, permit: OwnedSemaphorePermit) -> BrowserLease {
        BrowserLease {
            handle,
            permit: Some(permit),
            pool: Arc::clone(self),
        }
    }

    fn emit(&self, op: PoolOp, handle_id: &str) {
        let Some(events) = &self.events else {
            return;
        };
        let stats = self.stats();
        events.emit(ExtractionEvent::Pool {
            event: op,
            handle_id: handle_id.to_string(),
            pool_size: stats.pool_size,
            in_use_count: stats.in_use_count,
        });
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // The state is plain bookkeeping; a panic mid-update cannot leave it
        // half-written, so recover from poisoning.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Liveness probe bounded by `limit`. A hung engine counts as dead.
async fn probe(renderer: &Arc<dyn Renderer>, limit: Duration) -> bool {
    tokio::time::timeout(limit, renderer.is_alive())
        .await
        .unwrap_or(false)
}

async fn finish(mut lease: BrowserLease, force_discard: bool) {
    if lease.handle.alive && !force_discard {
        lease.handle.alive = probe(&lease.handle.renderer, lease.pool.config.probe_timeout).await;
    }
    if let Some(retired) = lease.settle(force_discard) {
        // Detached so a cancelled release still finishes the shutdown.
        if let Err(e) = tokio::spawn(retired.terminate()).await {
            debug!(error = %e, "browser retirement task failed");
        }
    }
}

/// A handle leaving the pool, still holding its permit so no replacement
/// can launch until the engine has shut down.
struct Retirement {
    handle: BrowserHandle,
    permit: OwnedSemaphorePermit,
}

impl Retirement {
    async fn terminate(self) -> OwnedSemaphorePermit {
        if let Err(e) = self.handle.renderer.shutdown().await {
            debug!(handle = %self.handle.id, error = %e, "browser shutdown failed");
        }
        self.permit
    }
}

/// A borrowed handle. Return it with [`BrowserPool::release`] or
/// [`BrowserPool::discard`]; a lease dropped without either (cancelled or
/// timed-out attempt) goes back to the pool on drop.
pub struct BrowserLease {
    handle: BrowserHandle,
    /// `None` once the lease has been settled.
    permit: Option<OwnedSemaphorePermit>,
    pool: Arc<BrowserPool>,
}

impl BrowserLease {
    pub fn handle(&self) -> &BrowserHandle {
        &self.handle
    }

    pub fn id(&self) -> &str {
        self.handle.id()
    }

    pub fn renderer(&self) -> Arc<dyn Renderer> {
        Arc::clone(&self.handle.renderer)
    }

    /// Flag the engine as crashed so release retires it without probing.
    pub fn mark_dead(&mut self) {
        self.handle.alive = false;
    }

    /// Synchronous bookkeeping for a returned handle. Either the handle goes
    /// to the front of the queue and the permit is released, or it is
    /// unregistered and handed back for termination with its permit.
    fn settle(&mut self, force_discard: bool) -> Option<Retirement> {
        let permit = self.permit.take()?;
        let pool = Arc::clone(&self.pool);
        let handle = &mut self.handle;
        handle.request_count += 1;

        let recycle = handle.request_count >= pool.config.recycle_threshold;
        // A tab that was never closed stays open in the engine.
        let leaked_tabs = handle.renderer.active_contexts() > 0;
        let retire = force_discard || !handle.alive || recycle || leaked_tabs;

        let mut st = pool.lock();
        st.in_use.remove(&handle.id);
        if !st.closed && !retire {
            st.available.push_front(handle.clone());
            drop(st);
            pool.emit(PoolOp::Release, &handle.id);
            drop(permit);
            return None;
        }
        st.engines.remove(&handle.id);
        drop(st);

        if recycle {
            debug!(handle = %handle.id, requests = handle.request_count, "recycling browser");
        } else if leaked_tabs {
            debug!(handle = %handle.id, "retiring browser with unclosed tabs");
        }
        pool.emit(PoolOp::Discard, &handle.id);
        Some(Retirement {
            handle: handle.clone(),
            permit,
        })
    }
}

impl Drop for BrowserLease {
    fn drop(&mut self) {
        let Some(retired) = self.settle(false) else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                rt.spawn(retired.terminate());
            }
            Err(_) => drop(retired),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::{NoopLauncher, RenderContext};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;

    struct StubRenderer {
        alive: AtomicBool,
    }

    #[async_trait]
    impl Renderer for StubRenderer {
        async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
            anyhow::bail!("stub renders nothing")
        }
        async fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }
        async fn shutdown(&self) -> Result<()> {
            self.alive.store(false, Ordering::SeqCst);
            Ok(())
        }
        fn active_contexts(&self) -> usize {
            0
        }
    }

    struct StubLauncher;

    #[async_trait]
    impl Launcher for StubLauncher {
        async fn launch(&self, _profile: &StealthProfile) -> Result<Arc<dyn Renderer>> {
            Ok(Arc::new(StubRenderer {
                alive: AtomicBool::new(true),
            }))
        }
    }

    fn config(capacity: usize, recycle: u32) -> PoolConfig {
        PoolConfig {
            capacity,
            recycle_threshold: recycle,
            acquire_timeout: Duration::from_secs(5),
            probe_timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn test_reuses_released_handle() {
        let pool = BrowserPool::new(Arc::new(StubLauncher), config(2, 50));
        let lease = pool.acquire().await.unwrap();
        let id = lease.id().to_string();
        pool.release(lease).await;

        let lease = pool.acquire().await.unwrap();
        assert_eq!(lease.id(), id);
        assert_eq!(lease.handle().request_count(), 1);
        assert_eq!(pool.stats().pool_size, 1);
        pool.release(lease).await;
    }

    #[tokio::test]
    async fn test_unavailable_engine() {
        let pool = BrowserPool::new(Arc::new(NoopLauncher), config(1, 50));
        assert!(matches!(
            pool.acquire().await,
            Err(PoolError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_discard_never_readds() {
        let pool = BrowserPool::new(Arc::new(StubLauncher), config(1, 50));
        let lease = pool.acquire().await.unwrap();
        let id = lease.id().to_string();
        pool.discard(lease).await;
        assert_eq!(pool.stats().pool_size, 0);

        let lease = pool.acquire().await.unwrap();
        assert_ne!(lease.id(), id);
        pool.release(lease).await;
    }

    #[tokio::test]
    async fn test_acquire_after_close_fails() {
        let pool = BrowserPool::new(Arc::new(StubLauncher), config(1, 50));
        pool.close_all().await;
        assert!(matches!(pool.acquire().await, Err(PoolError::Closed)));
    }
}
