// Copyright 2026 Marketlens Contributors
// SPDX-License-Identifier: Apache-2.0

//! Chromium engine via chromiumoxide.

use super::{Launcher, NavigationResult, RenderContext, Renderer};
use crate::config::WaitRule;
use crate::stealth::{StealthProfile, INIT_SCRIPT};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Environment variable overriding Chromium discovery.
pub const CHROMIUM_PATH_ENV: &str = "MARKETLENS_CHROMIUM_PATH";

const NETWORK_IDLE_QUIET: Duration = Duration::from_millis(500);

const NETWORK_STATE_JS: &str = "JSON.stringify({ready: document.readyState, \
     resources: performance.getEntriesByType('resource').length})";

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    if let Ok(p) = std::env::var(CHROMIUM_PATH_ENV) {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    if let Some(home) = dirs::home_dir() {
        let base = home.join(".marketlens/chromium");
        let candidates = if cfg!(target_os = "macos") {
            vec![
                base.join("chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                base.join("chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                base.join("chrome"),
            ]
        } else {
            vec![base.join("chrome-linux64/chrome"), base.join("chrome")]
        };
        if let Some(found) = candidates.into_iter().find(|c| c.exists()) {
            return Some(found);
        }
    }

    ["google-chrome", "chromium", "chromium-browser"]
        .iter()
        .find_map(|name| which::which(name).ok())
}

/// Launches headless Chromium processes.
pub struct ChromiumLauncher {
    executable: Option<PathBuf>,
}

impl ChromiumLauncher {
    pub fn new() -> Self {
        Self {
            executable: find_chromium(),
        }
    }

}

impl Default for ChromiumLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Launcher for ChromiumLauncher {
    async fn launch(&self, profile: &StealthProfile) -> Result<Arc<dyn Renderer>> {
        let chrome_path = self
            .executable
            .clone()
            .context("Chromium not found. Set MARKETLENS_CHROMIUM_PATH.")?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(profile.viewport_width, profile.viewport_height)
            .viewport(Viewport {
                width: profile.viewport_width,
                height: profile.viewport_height,
                ..Default::default()
            })
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking");
        for arg in profile.launch_args() {
            builder = builder.arg(arg);
        }
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "chromium handler event error");
                }
            }
        });

        Ok(Arc::new(ChromiumRenderer {
            browser: Mutex::new(Some(browser)),
            handler,
            active_count: Arc::new(AtomicUsize::new(0)),
        }))
    }

    fn is_available(&self) -> bool {
        self.executable.is_some()
    }
}

/// One Chromium process.
pub struct ChromiumRenderer {
    browser: Mutex<Option<Browser>>,
    handler: JoinHandle<()>,
    active_count: Arc<AtomicUsize>,
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let guard = self.browser.lock().await;
        let browser = guard.as_ref().context("browser has been shut down")?;
        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;
        drop(guard);

        page.evaluate_on_new_document(AddScriptToEvaluateOnNewDocumentParams::new(INIT_SCRIPT))
            .await
            .context("failed to install init script")?;

        self.active_count.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(ChromiumContext {
            page,
            active_count: Arc::clone(&self.active_count),
            closed: false,
        }))
    }

    async fn is_alive(&self) -> bool {
        if self.handler.is_finished() {
            return false;
        }
        let guard = self.browser.lock().await;
        match guard.as_ref() {
            Some(browser) => browser.version().await.is_ok(),
            None => false,
        }
    }

    async fn shutdown(&self) -> Result<()> {
        let taken = self.browser.lock().await.take();
        if let Some(mut browser) = taken {
            if let Err(e) = browser.close().await {
                debug!(error = %e, "browser close failed, process likely already gone");
            }
            if let Err(e) = browser.wait().await {
                warn!(error = %e, "failed waiting for browser process exit");
            }
        }
        self.handler.abort();
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// A single Chromium page context.
pub struct ChromiumContext {
    page: Page,
    active_count: Arc<AtomicUsize>,
    closed: bool,
}

impl ChromiumContext {
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        let start = Instant::now();
        let mut poll = Duration::from_millis(100);
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if start.elapsed() >= timeout {
                bail!("selector '{selector}' not found after {}ms", timeout.as_millis());
            }
            tokio::time::sleep(poll).await;
            poll = (poll * 2).min(Duration::from_secs(1));
        }
    }

    /// Idle once the document is complete and no new resource entries have
    /// appeared for [`NETWORK_IDLE_QUIET`].
    async fn wait_for_network_idle(&self, timeout: Duration) -> Result<()> {
        let start = Instant::now();
        let mut last_count = usize::MAX;
        let mut quiet_since = Instant::now();
        loop {
            let state: String = self
                .page
                .evaluate(NETWORK_STATE_JS)
                .await
                .context("failed to read network state")?
                .into_value()
                .map_err(|e| anyhow::anyhow!("failed to convert network state: {e:?}"))?;
            let state: serde_json::Value = serde_json::from_str(&state)?;
            let complete = state["ready"] == "complete";
            let count = state["resources"].as_u64().unwrap_or(0) as usize;

            if count != last_count {
                last_count = count;
                quiet_since = Instant::now();
            } else if complete && quiet_since.elapsed() >= NETWORK_IDLE_QUIET {
                return Ok(());
            }
            if start.elapsed() >= timeout {
                bail!("network did not go idle within {}ms", timeout.as_millis());
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        let start = Instant::now();
        let result =
            tokio::time::timeout(Duration::from_millis(timeout_ms), self.page.goto(url)).await;
        let load_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(_)) => {
                let final_url = self
                    .page
                    .url()
                    .await
                    .unwrap_or_default()
                    .unwrap_or_else(|| url.to_string());
                Ok(NavigationResult {
                    final_url,
                    load_time_ms,
                })
            }
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {timeout_ms}ms"),
        }
    }

    async fn wait_for(&self, rule: &WaitRule, timeout: Duration) -> Result<()> {
        match rule {
            WaitRule::NetworkIdle => self.wait_for_network_idle(timeout).await,
            WaitRule::Selector(selector) => self.wait_for_selector(selector, timeout).await,
        }
    }

    async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
        self.page
            .evaluate(script)
            .await
            .context("JS execution failed")?
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert JS result: {e:?}"))
    }

    async fn get_html(&self) -> Result<String> {
        self.page.content().await.context("failed to get HTML")
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let mut this = self;
        this.closed = true;
        this.active_count.fetch_sub(1, Ordering::Relaxed);
        if let Err(e) = this.page.clone().close().await {
            debug!(error = %e, "page close failed");
        }
        Ok(())
    }
}

impl Drop for ChromiumContext {
    /// A context dropped mid-render (timed-out or cancelled attempt) closes
    /// its tab in the background.
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        let page = self.page.clone();
        if let Ok(rt) = tokio::runtime::Handle::try_current() {
            rt.spawn(async move {
                if let Err(e) = page.close().await {
                    debug!(error = %e, "orphaned page close failed");
                }
            });
        }
    }
}
