// Copyright 2026 Marketlens Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error vocabulary shared by every extraction strategy, the browser pool
//! and the router.

use crate::attempt::AttemptRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The closed set of ways a single strategy attempt can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    RateLimited,
    NetworkError,
    InvalidSchema,
    ItemNotFound,
    AdapterDisabled,
    ParseError,
}

impl ErrorKind {
    /// Transient kinds, eligible for backoff retry of the same strategy.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::RateLimited | ErrorKind::NetworkError
        )
    }

    /// Kinds that stop the whole fallback chain, not just the current strategy.
    pub fn is_chain_aborting(self) -> bool {
        matches!(self, ErrorKind::ItemNotFound)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::InvalidSchema => "invalid_schema",
            ErrorKind::ItemNotFound => "item_not_found",
            ErrorKind::AdapterDisabled => "adapter_disabled",
            ErrorKind::ParseError => "parse_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured context attached to an [`ExtractionError`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
}

/// A failed strategy attempt.
///
/// The retryable/terminal classification is fixed when the error is built
/// and never changes as the error travels through the router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ExtractionError {
    kind: ErrorKind,
    retryable: bool,
    message: String,
    metadata: ErrorMetadata,
}

impl ExtractionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            retryable: kind.is_retryable(),
            message: message.into(),
            metadata: ErrorMetadata::default(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimited, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NetworkError, message)
    }

    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidSchema, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ItemNotFound, message)
    }

    pub fn disabled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AdapterDisabled, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParseError, message)
    }

    /// Attach the offending URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.metadata.url = Some(url.into());
        self
    }

    /// Attach the upstream HTTP status.
    pub fn with_status(mut self, status: u16) -> Self {
        self.metadata.http_status = Some(status);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    pub fn is_chain_aborting(&self) -> bool {
        self.kind.is_chain_aborting()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn metadata(&self) -> &ErrorMetadata {
        &self.metadata
    }
}

/// Why the router gave up on a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Every applicable strategy was tried and failed.
    Exhausted,
    /// A strategy reported the item does not exist; the chain was aborted.
    ItemNotFound,
    /// Shutdown began while the extraction was in flight.
    Cancelled,
    /// No enabled strategy applies to the URL.
    NoStrategy,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureReason::Exhausted => "all strategies exhausted",
            FailureReason::ItemNotFound => "item not found",
            FailureReason::Cancelled => "cancelled",
            FailureReason::NoStrategy => "no applicable strategy",
        };
        f.write_str(s)
    }
}

/// The only failure visible to callers of the router: every strategy failed.
#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[error("extraction of {url} failed: {reason} after {n} attempt(s)", n = .attempts.len())]
pub struct AggregateExtractionError {
    pub url: String,
    pub reason: FailureReason,
    pub attempts: Vec<AttemptRecord>,
}

/// Failures of the browser pool itself. Never surfaced to router callers
/// directly; the browser strategy maps them onto [`ExtractionError`].
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("browser pool is closed")]
    Closed,

    #[error("no browser engine available: {0}")]
    Unavailable(String),

    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("timed out after {0:?} waiting for a free browser")]
    AcquireTimeout(Duration),
}

impl From<PoolError> for ExtractionError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Closed => ExtractionError::disabled(err.to_string()),
            PoolError::Unavailable(_) => ExtractionError::disabled(err.to_string()),
            PoolError::Launch(_) => ExtractionError::network(err.to_string()),
            PoolError::AcquireTimeout(_) => ExtractionError::timeout(err.to_string()),
        }
    }
}

/// Problems loading an [`crate::config::ExtractionConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown strategy \"{0}\"")]
    UnknownStrategy(String),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },
}
