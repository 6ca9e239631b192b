// Copyright 2026 Marketlens Contributors
// SPDX-License-Identifier: Apache-2.0

//! Per-call extraction settings.
//!
//! Every field has a default, so `{}` is a valid configuration file. Unset
//! per-strategy options fall back to the strategy's declared defaults.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_POOL_CAPACITY: usize = 3;
pub const DEFAULT_RECYCLE_THRESHOLD: u32 = 50;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1_000;
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 4_000;
pub const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 30_000;

/// Overrides for a single strategy. `None` keeps the strategy default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StrategyOverride {
    pub timeout_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub requests_per_minute: Option<u32>,
}

/// Granularity of rate-limit buckets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitScope {
    /// One bucket per strategy, shared by every domain.
    #[default]
    PerStrategy,
    /// One bucket per strategy and target host.
    PerStrategyAndDomain,
}

/// What the browser strategy waits for before reading the page.
///
/// JSON form: `"network_idle"` or `{"selector": "#price"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitRule {
    #[default]
    NetworkIdle,
    Selector(String),
}

/// Marketplace API tokens, keyed by marketplace id (`"ebay"`).
///
/// Values never appear in `Debug` output.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(BTreeMap<String, String>);

impl Credentials {
    pub fn insert(&mut self, marketplace: impl Into<String>, token: impl Into<String>) {
        self.0.insert(marketplace.into(), token.into());
    }

    /// Token for `marketplace`, falling back to `MARKETLENS_<MARKETPLACE>_TOKEN`.
    pub fn get(&self, marketplace: &str) -> Option<String> {
        self.0
            .get(marketplace)
            .cloned()
            .or_else(|| std::env::var(token_env_var(marketplace)).ok())
            .filter(|t| !t.trim().is_empty())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

pub fn token_env_var(marketplace: &str) -> String {
    format!("MARKETLENS_{}_TOKEN", marketplace.to_ascii_uppercase())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractionConfig {
    /// Strategies allowed to run. `None` enables every registered strategy.
    pub enabled_strategies: Option<BTreeSet<String>>,
    pub per_strategy_overrides: BTreeMap<String, StrategyOverride>,
    /// Read once, when the browser pool is constructed.
    pub pool_capacity: usize,
    /// Read once, when the browser pool is constructed.
    pub recycle_threshold: u32,
    /// Fields whose absence downgrades a record to partial quality.
    pub mandatory_fields: BTreeSet<String>,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub rate_limit_scope: RateLimitScope,
    /// Host pattern → load signal for the browser strategy.
    pub wait_rules: BTreeMap<String, WaitRule>,
    pub credentials: Credentials,
    /// Marketplace id → API base URL override.
    pub api_base_url: BTreeMap<String, String>,
    pub acquire_timeout_ms: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            enabled_strategies: None,
            per_strategy_overrides: BTreeMap::new(),
            pool_capacity: DEFAULT_POOL_CAPACITY,
            recycle_threshold: DEFAULT_RECYCLE_THRESHOLD,
            mandatory_fields: BTreeSet::from([crate::record::FIELD_PRICE.to_string()]),
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            retry_max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
            rate_limit_scope: RateLimitScope::default(),
            wait_rules: BTreeMap::new(),
            credentials: Credentials::default(),
            api_base_url: BTreeMap::new(),
            acquire_timeout_ms: DEFAULT_ACQUIRE_TIMEOUT_MS,
        }
    }
}

impl ExtractionConfig {
    /// Load a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })
    }

    /// Check internal consistency against the registered strategy names.
    pub fn validate(&self, known_strategies: &[&str]) -> Result<(), ConfigError> {
        let unknown = self
            .enabled_strategies
            .iter()
            .flatten()
            .chain(self.per_strategy_overrides.keys())
            .find(|name| !known_strategies.contains(&name.as_str()));
        if let Some(name) = unknown {
            return Err(ConfigError::UnknownStrategy(name.clone()));
        }
        if self.pool_capacity == 0 {
            return Err(invalid("pool_capacity", "must be at least 1"));
        }
        if self.recycle_threshold == 0 {
            return Err(invalid("recycle_threshold", "must be at least 1"));
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return Err(invalid(
                "retry_base_delay_ms",
                "must not exceed retry_max_delay_ms",
            ));
        }
        for (name, ov) in &self.per_strategy_overrides {
            if ov.max_retries == Some(0) {
                return Err(invalid(
                    &format!("per_strategy_overrides.{name}.max_retries"),
                    "must be at least 1",
                ));
            }
            if ov.requests_per_minute == Some(0) {
                return Err(invalid(
                    &format!("per_strategy_overrides.{name}.requests_per_minute"),
                    "must be at least 1",
                ));
            }
        }
        Ok(())
    }

    pub fn is_enabled(&self, strategy: &str) -> bool {
        self.enabled_strategies
            .as_ref()
            .map_or(true, |set| set.contains(strategy))
    }

    pub fn override_for(&self, strategy: &str) -> StrategyOverride {
        self.per_strategy_overrides
            .get(strategy)
            .copied()
            .unwrap_or_default()
    }

    /// The most specific (longest) wait rule pattern matching `host`.
    pub fn wait_rule_for(&self, host: &str) -> WaitRule {
        self.wait_rules
            .iter()
            .filter(|(pattern, _)| crate::strategy::glob_match(pattern, host))
            .max_by_key(|(pattern, _)| pattern.len())
            .map(|(_, rule)| rule.clone())
            .unwrap_or_default()
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KNOWN: &[&str] = &["api", "structured_metadata", "browser"];

    #[test]
    fn test_empty_object_is_defaults() {
        let cfg: ExtractionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, ExtractionConfig::default());
        assert_eq!(cfg.pool_capacity, 3);
        assert_eq!(cfg.recycle_threshold, 50);
        assert!(cfg.mandatory_fields.contains("price"));
        assert!(cfg.is_enabled("browser"));
        cfg.validate(KNOWN).unwrap();
    }

    #[test]
    fn test_full_config_parses() {
        let json = r##"{
            "enabled_strategies": ["structured_metadata", "browser"],
            "per_strategy_overrides": {"browser": {"timeout_ms": 12000, "max_retries": 2}},
            "pool_capacity": 5,
            "rate_limit_scope": "per_strategy_and_domain",
            "wait_rules": {"*.ebay.*": {"selector": "#prcIsum"}, "*": "network_idle"},
            "credentials": {"ebay": "tok"}
        }"##;
        let cfg: ExtractionConfig = serde_json::from_str(json).unwrap();
        cfg.validate(KNOWN).unwrap();
        assert!(!cfg.is_enabled("api"));
        assert_eq!(cfg.override_for("browser").timeout_ms, Some(12000));
        assert_eq!(cfg.override_for("api"), StrategyOverride::default());
        assert_eq!(cfg.rate_limit_scope, RateLimitScope::PerStrategyAndDomain);
        assert_eq!(
            cfg.wait_rule_for("www.ebay.com"),
            WaitRule::Selector("#prcIsum".into())
        );
        assert_eq!(cfg.wait_rule_for("shop.example.com"), WaitRule::NetworkIdle);
        assert_eq!(cfg.credentials.get("ebay").as_deref(), Some("tok"));
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let cfg: ExtractionConfig =
            serde_json::from_str(r#"{"enabled_strategies": ["scraper"]}"#).unwrap();
        assert!(matches!(
            cfg.validate(KNOWN),
            Err(ConfigError::UnknownStrategy(name)) if name == "scraper"
        ));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let cfg = ExtractionConfig {
            pool_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(KNOWN), Err(ConfigError::Invalid { .. })));

        let cfg = ExtractionConfig {
            retry_base_delay_ms: 5_000,
            retry_max_delay_ms: 1_000,
            ..Default::default()
        };
        assert!(cfg.validate(KNOWN).is_err());
    }

    #[test]
    fn test_unknown_field_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"pool_size": 4}"#).unwrap();
        assert!(matches!(
            ExtractionConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            ExtractionConfig::load(&dir.path().join("missing.json")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_credentials_debug_hides_tokens() {
        let mut creds = Credentials::default();
        creds.insert("ebay", "super-secret");
        let dbg = format!("{creds:?}");
        assert!(dbg.contains("ebay"));
        assert!(!dbg.contains("super-secret"));
    }
}
