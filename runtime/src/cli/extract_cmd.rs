// Copyright 2026 Marketlens Contributors
// SPDX-License-Identifier: Apache-2.0

//! `marketlens extract <url>`: run the fallback chain once.

use crate::acquisition::http_client::HttpClient;
use crate::audit::AuditLogger;
use crate::cli::output;
use crate::config::ExtractionConfig;
use crate::events::EventBus;
use crate::pool::{BrowserPool, PoolConfig};
use crate::renderer::chromium::ChromiumLauncher;
use crate::router::Router;
use crate::strategy::StrategyRegistry;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Load configuration from `path` (or defaults) and apply `--only`.
pub fn load_config(path: Option<&Path>, only: &[String]) -> Result<ExtractionConfig> {
    let mut config = match path {
        Some(p) => ExtractionConfig::load(p)?,
        None => ExtractionConfig::default(),
    };
    if !only.is_empty() {
        config.enabled_strategies = Some(only.iter().cloned().collect());
    }
    Ok(config)
}

pub async fn run(url: &str, config_path: Option<&Path>, only: &[String]) -> Result<()> {
    url::Url::parse(url).with_context(|| format!("not a valid URL: {url}"))?;
    let config = load_config(config_path, only)?;

    let events = EventBus::default();
    let audit = match AuditLogger::default_logger() {
        Ok(logger) => Some(tokio::spawn(logger.run(events.subscribe()))),
        Err(e) => {
            warn!(error = %e, "audit log unavailable");
            None
        }
    };

    let pool = BrowserPool::with_events(
        Arc::new(ChromiumLauncher::new()),
        PoolConfig::from(&config),
        events.clone(),
    );
    let registry = StrategyRegistry::standard(HttpClient::new(), Arc::clone(&pool));
    config
        .validate(&registry.names())
        .context("invalid extraction config")?;

    let shutdown = CancellationToken::new();
    let ctrl_c = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, cancelling extraction");
                shutdown.cancel();
            }
        })
    };

    let router = Router::new(registry, events.clone(), shutdown.clone());
    if !output::is_quiet() && !output::is_json() {
        eprintln!("  Extracting {url}...");
    }
    let result = router.extract_with_report(url, &config).await;

    ctrl_c.abort();
    pool.close_all().await;
    drop(router);
    drop(pool);
    drop(events);
    if let Some(task) = audit {
        // The logger exits once every sender is gone.
        let _ = tokio::time::timeout(Duration::from_secs(2), task).await;
    }

    match result {
        Ok(report) => {
            output::print_report(&report);
            Ok(())
        }
        Err(err) => {
            if output::is_json() {
                output::print_json(&err);
            } else if !output::is_quiet() {
                eprint!("{}", output::render_attempts(&err.attempts));
            }
            Err(err.into())
        }
    }
}
