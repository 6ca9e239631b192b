// Copyright 2026 Marketlens Contributors
// SPDX-License-Identifier: Apache-2.0

//! Environment readiness check.

use crate::audit::logger::default_path;
use crate::cli::extract_cmd::load_config;
use crate::cli::output;
use crate::config::{token_env_var, Credentials, ExtractionConfig};
use crate::renderer::chromium::{find_chromium, CHROMIUM_PATH_ENV};
use anyhow::Result;
use std::path::Path;

const API_MARKETPLACES: &[&str] = &["ebay"];

/// Report Chromium availability, API credentials and the effective config.
pub async fn run(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path, &[])?;
    let chromium = find_chromium();
    let credentials: Vec<(&str, bool)> = API_MARKETPLACES
        .iter()
        .map(|mp| (*mp, config.credentials.get(mp).is_some()))
        .collect();

    if output::is_json() {
        let redacted = ExtractionConfig {
            credentials: Credentials::default(),
            ..config.clone()
        };
        output::print_json(&serde_json::json!({
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "chromium": chromium.as_ref().map(|p| p.display().to_string()),
            "credentials": credentials
                .iter()
                .map(|(mp, ok)| (mp.to_string(), *ok))
                .collect::<std::collections::BTreeMap<_, _>>(),
            "audit_log": default_path().display().to_string(),
            "config": redacted,
        }));
        return Ok(());
    }

    println!("Marketlens Doctor");
    println!("=================");
    println!();
    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    match &chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!(
            "[!!] Chromium NOT found. Set {CHROMIUM_PATH_ENV}; the browser strategy is disabled."
        ),
    }
    for (mp, ok) in &credentials {
        if *ok {
            println!("[OK] API credential configured for {mp}");
        } else {
            println!(
                "[--] No API credential for {mp} (set {}); the api strategy will be skipped",
                token_env_var(mp)
            );
        }
    }
    println!("[OK] Audit log: {}", default_path().display());
    println!();

    let enabled = match &config.enabled_strategies {
        Some(set) => set.iter().cloned().collect::<Vec<_>>().join(", "),
        None => "all".to_string(),
    };
    println!("Strategies:       {enabled}");
    println!("Pool capacity:    {}", config.pool_capacity);
    println!("Recycle after:    {} requests", config.recycle_threshold);
    println!(
        "Retry backoff:    {}ms base, {}ms cap",
        config.retry_base_delay_ms, config.retry_max_delay_ms
    );
    println!("Rate-limit scope: {:?}", config.rate_limit_scope);
    println!();

    if chromium.is_some() {
        println!("Status: READY");
    } else {
        println!("Status: READY (HTTP strategies only)");
    }
    Ok(())
}
