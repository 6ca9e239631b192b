// Copyright 2026 Marketlens Contributors
// SPDX-License-Identifier: Apache-2.0

//! Pluggable extraction strategies and the registry that orders them.
//!
//! A strategy is one self-contained technique for turning a listing URL
//! into a [`NormalizedRecord`]. Strategies are pure `attempt → Result`
//! functions: they never sleep, retry, or consult the rate limiter. The
//! router owns all of that.

pub mod api;
pub mod browser;
pub mod structured;

use crate::acquisition::http_client::HttpClient;
use crate::config::ExtractionConfig;
use crate::error::ExtractionError;
use crate::pool::BrowserPool;
use crate::record::NormalizedRecord;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use api::ApiStrategy;
pub use browser::BrowserStrategy;
pub use structured::StructuredMetadataStrategy;

/// One technique for extracting a record from a listing URL.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Stable identifier used in configuration, logs and telemetry.
    fn name(&self) -> &str;

    /// Lower runs first.
    fn priority(&self) -> u32;

    /// Host globs this strategy applies to. `*` matches any run of characters.
    fn domain_patterns(&self) -> &[&str] {
        &["*"]
    }

    /// Default hard timeout for a single try.
    fn timeout(&self) -> Duration;

    /// Default total number of tries, the first one included.
    fn max_retries(&self) -> u32;

    /// Default token bucket size for this strategy.
    fn requests_per_minute(&self) -> u32;

    /// Make one try. Must not retry or sleep internally.
    async fn attempt(
        &self,
        url: &str,
        config: &ExtractionConfig,
    ) -> Result<NormalizedRecord, ExtractionError>;
}

/// Whether `strategy` declares a pattern matching the host of `url`.
pub fn applies_to(strategy: &dyn Strategy, url: &str) -> bool {
    let host = host_of(url).unwrap_or_default();
    strategy
        .domain_patterns()
        .iter()
        .any(|pattern| glob_match(pattern, &host))
}

/// Lower-cased host of `url`, if it parses.
pub fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
}

/// Case-insensitive glob match where `*` matches any (possibly empty) run
/// of characters, dots included.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.to_ascii_lowercase().chars().collect();
    let t: Vec<char> = text.to_ascii_lowercase().chars().collect();

    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;

    while ti < t.len() {
        if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ti;
            pi += 1;
        } else if pi < p.len() && p[pi] == t[ti] {
            pi += 1;
            ti += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ti = mark;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

/// A strategy's effective settings for one call: declared defaults with the
/// caller's overrides applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategySpec {
    pub name: String,
    pub priority: u32,
    pub timeout: Duration,
    pub max_retries: u32,
    pub requests_per_minute: u32,
}

impl StrategySpec {
    pub fn resolve(strategy: &dyn Strategy, config: &ExtractionConfig) -> Self {
        let ov = config.override_for(strategy.name());
        Self {
            name: strategy.name().to_string(),
            priority: strategy.priority(),
            timeout: ov
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| strategy.timeout()),
            max_retries: ov.max_retries.unwrap_or_else(|| strategy.max_retries()).max(1),
            requests_per_minute: ov
                .requests_per_minute
                .unwrap_or_else(|| strategy.requests_per_minute())
                .max(1),
        }
    }
}

/// The fixed, priority-ordered list of strategies. Built once per process.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    strategies: Vec<Arc<dyn Strategy>>,
}

impl StrategyRegistry {
    /// Order `strategies` by priority. Ties keep insertion order.
    pub fn new(mut strategies: Vec<Arc<dyn Strategy>>) -> Self {
        strategies.sort_by_key(|s| s.priority());
        Self { strategies }
    }

    /// The standard chain: marketplace API, embedded metadata, rendered page.
    pub fn standard(http: HttpClient, pool: Arc<BrowserPool>) -> Self {
        Self::new(vec![
            Arc::new(ApiStrategy::new(http.clone())),
            Arc::new(StructuredMetadataStrategy::new(http)),
            Arc::new(BrowserStrategy::new(pool)),
        ])
    }

    pub fn names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Strategy>> {
        self.strategies.iter()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}
