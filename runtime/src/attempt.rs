// Copyright 2026 Marketlens Contributors
// SPDX-License-Identifier: Apache-2.0

//! Per-try diagnostics collected by the router.

use crate::error::{ErrorKind, ExtractionError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// How a single strategy try ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    Failed,
    /// The strategy declined to run (e.g. no credential configured).
    Skipped,
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttemptOutcome::Succeeded => "succeeded",
            AttemptOutcome::Failed => "failed",
            AttemptOutcome::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// One try of one strategy against one URL. Ephemeral: handed to telemetry
/// and to the caller's diagnostics, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub strategy: String,
    pub url: String,
    pub outcome: AttemptOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ExtractionError>,
    pub duration_ms: u64,
    /// Zero for the first try of a strategy, then 1, 2, ...
    pub retry: u32,
}

impl AttemptRecord {
    pub fn succeeded(strategy: &str, url: &str, duration: Duration, retry: u32) -> Self {
        Self {
            strategy: strategy.to_string(),
            url: url.to_string(),
            outcome: AttemptOutcome::Succeeded,
            error: None,
            duration_ms: duration.as_millis() as u64,
            retry,
        }
    }

    /// Record a failed try. `AdapterDisabled` is recorded as a skip: the
    /// strategy never reached its source.
    pub fn failed(
        strategy: &str,
        url: &str,
        error: ExtractionError,
        duration: Duration,
        retry: u32,
    ) -> Self {
        let outcome = if error.kind() == ErrorKind::AdapterDisabled {
            AttemptOutcome::Skipped
        } else {
            AttemptOutcome::Failed
        };
        Self {
            strategy: strategy.to_string(),
            url: url.to_string(),
            outcome,
            error: Some(error),
            duration_ms: duration.as_millis() as u64,
            retry,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(ExtractionError::kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_disabled_counts_as_skip() {
        let rec = AttemptRecord::failed(
            "api",
            "https://www.ebay.com/itm/1",
            ExtractionError::disabled("no credential"),
            Duration::from_millis(1),
            0,
        );
        assert_eq!(rec.outcome, AttemptOutcome::Skipped);
        assert_eq!(rec.error_kind(), Some(ErrorKind::AdapterDisabled));
    }

    #[test]
    fn test_attempt_serialization() {
        let rec = AttemptRecord::failed(
            "browser",
            "https://shop.example.com/p/1",
            ExtractionError::timeout("navigation timed out"),
            Duration::from_millis(8000),
            1,
        );
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["duration_ms"], 8000);
        assert_eq!(json["error"]["kind"], "timeout");
    }
}
