// Copyright 2026 Marketlens Contributors
// SPDX-License-Identifier: Apache-2.0

//! In-process browser engine for pool and browser-strategy tests.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use marketlens_runtime::config::WaitRule;
use marketlens_runtime::renderer::{Launcher, NavigationResult, RenderContext, Renderer};
use marketlens_runtime::stealth::StealthProfile;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How the fake page behaves once navigated.
#[derive(Clone, Default)]
pub struct FakePage {
    /// Value returned by any script, usually a JSON string.
    pub script_result: serde_json::Value,
    pub html: String,
    /// Navigation fails with this message when set.
    pub nav_error: Option<String>,
    /// Navigation crashes the engine.
    pub crash_on_nav: bool,
    /// Navigation never completes.
    pub hang_on_nav: bool,
}

pub struct FakeRenderer {
    pub alive: Arc<AtomicBool>,
    pub shutdowns: AtomicUsize,
    pub contexts: AtomicUsize,
    /// Tabs opened and not yet closed. A dropped context stays open.
    pub open_contexts: Arc<AtomicUsize>,
    probe_delay: Duration,
    page: FakePage,
}

impl FakeRenderer {
    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        self.contexts.fetch_add(1, Ordering::SeqCst);
        self.open_contexts.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeContext {
            page: self.page.clone(),
            engine_alive: Arc::clone(&self.alive),
            open: Arc::clone(&self.open_contexts),
        }))
    }

    async fn is_alive(&self) -> bool {
        if !self.probe_delay.is_zero() {
            tokio::time::sleep(self.probe_delay).await;
        }
        self.alive.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) -> Result<()> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        self.alive.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.open_contexts.load(Ordering::SeqCst)
    }
}

pub struct FakeContext {
    page: FakePage,
    engine_alive: Arc<AtomicBool>,
    open: Arc<AtomicUsize>,
}

#[async_trait]
impl RenderContext for FakeContext {
    async fn navigate(&mut self, url: &str, _timeout_ms: u64) -> Result<NavigationResult> {
        if self.page.crash_on_nav {
            self.engine_alive.store(false, Ordering::SeqCst);
            anyhow::bail!("target crashed");
        }
        if let Some(msg) = &self.page.nav_error {
            anyhow::bail!("{msg}");
        }
        if self.page.hang_on_nav {
            std::future::pending::<()>().await;
        }
        Ok(NavigationResult {
            final_url: url.to_string(),
            load_time_ms: 5,
        })
    }

    async fn wait_for(&self, _rule: &WaitRule, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    async fn execute_js(&self, _script: &str) -> Result<serde_json::Value> {
        Ok(self.page.script_result.clone())
    }

    async fn get_html(&self) -> Result<String> {
        Ok(self.page.html.clone())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.open.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Launcher that keeps every engine it starts so tests can inspect or kill
/// them.
#[derive(Default)]
pub struct FakeLauncher {
    pub launched: Mutex<Vec<Arc<FakeRenderer>>>,
    pub page: FakePage,
    /// How long each liveness probe takes.
    pub probe_delay: Duration,
}

impl FakeLauncher {
    pub fn with_page(page: FakePage) -> Self {
        Self {
            page,
            ..Default::default()
        }
    }

    /// Engines whose liveness probe hangs for `delay`.
    pub fn with_probe_delay(delay: Duration) -> Self {
        Self {
            probe_delay: delay,
            ..Default::default()
        }
    }

    /// Engines that are alive right now.
    pub fn live_engines(&self) -> usize {
        self.launched
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.alive.load(Ordering::SeqCst))
            .count()
    }

    pub fn launches(&self) -> usize {
        self.launched.lock().unwrap().len()
    }

    pub fn engine(&self, n: usize) -> Arc<FakeRenderer> {
        Arc::clone(&self.launched.lock().unwrap()[n])
    }
}

#[async_trait]
impl Launcher for FakeLauncher {
    async fn launch(&self, _profile: &StealthProfile) -> Result<Arc<dyn Renderer>> {
        let engine = Arc::new(FakeRenderer {
            alive: Arc::new(AtomicBool::new(true)),
            shutdowns: AtomicUsize::new(0),
            contexts: AtomicUsize::new(0),
            open_contexts: Arc::new(AtomicUsize::new(0)),
            probe_delay: self.probe_delay,
            page: self.page.clone(),
        });
        self.launched.lock().unwrap().push(Arc::clone(&engine));
        Ok(engine)
    }
}
