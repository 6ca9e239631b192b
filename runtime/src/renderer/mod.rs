// Copyright 2026 Marketlens Contributors
// SPDX-License-Identifier: Apache-2.0

//! Renderer abstraction for browser-based page rendering.
//!
//! A [`Launcher`] starts browser engines; each engine is a [`Renderer`] that
//! hands out [`RenderContext`]s (tabs). The browser pool owns renderers and
//! the browser strategy drives contexts. Chromium via chromiumoxide is the
//! only real engine; tests plug in their own.

pub mod chromium;

use crate::config::WaitRule;
use crate::stealth::StealthProfile;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// Starts browser engines.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Launch one engine with the given anti-detection profile.
    async fn launch(&self, profile: &StealthProfile) -> Result<Arc<dyn Renderer>>;
    /// Whether an engine binary is available at all.
    fn is_available(&self) -> bool {
        true
    }
}

/// A running browser engine that can create rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new browser context (tab).
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Cheap liveness probe. A crashed engine reports `false`.
    async fn is_alive(&self) -> bool;
    /// Terminate the engine. Safe to call on an already dead engine.
    async fn shutdown(&self) -> Result<()>;
    /// Number of currently open contexts.
    fn active_contexts(&self) -> usize;
}

/// A single browser context (tab) for rendering pages.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate to a URL with a timeout.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult>;
    /// Block until the page satisfies `rule` or `timeout` elapses.
    async fn wait_for(&self, rule: &WaitRule, timeout: Duration) -> Result<()>;
    /// Execute JavaScript in the page context and return the result.
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value>;
    /// Get the full page HTML.
    async fn get_html(&self) -> Result<String>;
    /// Close this context.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// A launcher used when Chromium is unavailable.
///
/// The HTTP strategies work without a browser; the browser strategy reports
/// itself disabled.
pub struct NoopLauncher;

#[async_trait]
impl Launcher for NoopLauncher {
    async fn launch(&self, _profile: &StealthProfile) -> Result<Arc<dyn Renderer>> {
        Err(anyhow::anyhow!("browser not available, HTTP-only mode"))
    }

    fn is_available(&self) -> bool {
        false
    }
}
