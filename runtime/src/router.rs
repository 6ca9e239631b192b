// Copyright 2026 Marketlens Contributors
// SPDX-License-Identifier: Apache-2.0

//! The fallback controller.
//!
//! For one URL the router walks the priority-ordered strategies that apply
//! to its host, strictly one at a time:
//!
//! ```text
//! PENDING → TRYING(i) → SUCCESS
//!                     → TRYING(i) again   (retryable error, budget left)
//!                     → TRYING(i+1)       (terminal error or budget spent)
//!                     → EXHAUSTED         (no strategy left, or ItemNotFound)
//! ```
//!
//! Each try takes a rate-limit token, runs under its own hard timeout and
//! yields one [`AttemptRecord`]. Only total failure reaches the caller, as an
//! [`AggregateExtractionError`] carrying every record.

use crate::attempt::AttemptRecord;
use crate::config::ExtractionConfig;
use crate::error::{AggregateExtractionError, ExtractionError, FailureReason};
use crate::events::{now_timestamp, EventBus, ExtractionEvent};
use crate::rate_limit::{bucket_key, RateLimiter};
use crate::record::NormalizedRecord;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::strategy::{applies_to, Strategy, StrategyRegistry, StrategySpec};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

/// A successful extraction together with the trail that led to it.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionReport {
    pub record: NormalizedRecord,
    /// Name of the strategy that produced the record.
    pub strategy: String,
    pub attempts: Vec<AttemptRecord>,
    pub total_ms: u64,
}

pub struct Router {
    registry: StrategyRegistry,
    limiter: Arc<RateLimiter>,
    events: EventBus,
    shutdown: CancellationToken,
}

impl Router {
    pub fn new(registry: StrategyRegistry, events: EventBus, shutdown: CancellationToken) -> Self {
        Self {
            registry,
            limiter: Arc::new(RateLimiter::new()),
            events,
            shutdown,
        }
    }

    /// Share token buckets with other routers in the process.
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    /// Extract a normalized record from `url`.
    pub async fn extract(
        &self,
        url: &str,
        config: &ExtractionConfig,
    ) -> Result<NormalizedRecord, AggregateExtractionError> {
        self.extract_with_report(url, config)
            .await
            .map(|report| report.record)
    }

    /// Like [`Router::extract`], also returning the attempt trail.
    pub async fn extract_with_report(
        &self,
        url: &str,
        config: &ExtractionConfig,
    ) -> Result<ExtractionReport, AggregateExtractionError> {
        let span = info_span!("extract", url = %url);
        self.run_chain(url, config).instrument(span).await
    }

    async fn run_chain(
        &self,
        url: &str,
        config: &ExtractionConfig,
    ) -> Result<ExtractionReport, AggregateExtractionError> {
        let started = Instant::now();
        let chain: Vec<&Arc<dyn Strategy>> = self
            .registry
            .iter()
            .filter(|&s| applies_to(&**s, url))
            .collect();

        self.events.emit(ExtractionEvent::ExtractionStarted {
            url: url.to_string(),
            strategies: chain.iter().map(|s| s.name().to_string()).collect(),
            timestamp: now_timestamp(),
        });

        let policy = RetryPolicy::from_config(config);
        let mut attempts: Vec<AttemptRecord> = Vec::new();

        for strategy in chain {
            let name = strategy.name();
            if !config.is_enabled(name) {
                info!(strategy = name, "strategy disabled by configuration, skipping");
                self.events.emit(ExtractionEvent::StrategySkipped {
                    url: url.to_string(),
                    strategy: name.to_string(),
                    reason: "disabled by configuration".to_string(),
                });
                continue;
            }

            let spec = StrategySpec::resolve(&**strategy, config);
            let key = bucket_key(name, url, config.rate_limit_scope);
            let mut tries: u32 = 0;

            loop {
                if self.shutdown.is_cancelled() {
                    return Err(self.fail(url, FailureReason::Cancelled, attempts, started));
                }
                tries += 1;
                let retry = tries - 1;
                let t0 = Instant::now();

                let outcome = match self.limiter.try_acquire(&key, spec.requests_per_minute) {
                    Err(wait) => Err(ExtractionError::rate_limited(format!(
                        "local rate limit for {key}, next token in {}ms",
                        wait.as_millis()
                    ))
                    .with_url(url)),
                    Ok(()) => {
                        let attempt = tokio::time::timeout(spec.timeout, strategy.attempt(url, config));
                        tokio::select! {
                            biased;
                            _ = self.shutdown.cancelled() => {
                                return Err(self.fail(url, FailureReason::Cancelled, attempts, started));
                            }
                            res = attempt => res.unwrap_or_else(|_| {
                                Err(ExtractionError::timeout(format!(
                                    "attempt exceeded {}ms",
                                    spec.timeout.as_millis()
                                ))
                                .with_url(url))
                            }),
                        }
                    }
                };
                let elapsed = t0.elapsed();

                let err = match outcome {
                    Ok(record) => {
                        let rec = AttemptRecord::succeeded(name, url, elapsed, retry);
                        self.events.emit(ExtractionEvent::attempt(&rec));
                        attempts.push(rec);
                        return Ok(self.succeed(url, name, record, attempts, started));
                    }
                    Err(err) => err,
                };

                debug!(
                    strategy = name,
                    attempt = retry,
                    error_kind = %err.kind(),
                    error = %err,
                    "strategy attempt failed"
                );
                let decision = policy.decide(&err, tries, spec.max_retries);
                let chain_abort = err.is_chain_aborting();
                let rec = AttemptRecord::failed(name, url, err, elapsed, retry);
                self.events.emit(ExtractionEvent::attempt(&rec));
                attempts.push(rec);

                if chain_abort {
                    info!(strategy = name, "item not found, aborting fallback chain");
                    return Err(self.fail(url, FailureReason::ItemNotFound, attempts, started));
                }

                match decision {
                    RetryDecision::RetryAfter(delay) => {
                        debug!(strategy = name, delay_ms = delay.as_millis() as u64, "backing off");
                        tokio::select! {
                            _ = self.shutdown.cancelled() => {
                                return Err(self.fail(url, FailureReason::Cancelled, attempts, started));
                            }
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    RetryDecision::Terminal | RetryDecision::Exhausted => {
                        if decision == RetryDecision::Exhausted {
                            warn!(strategy = name, tries, "retry budget spent");
                        }
                        break;
                    }
                }
            }
        }

        let reason = if attempts.is_empty() {
            FailureReason::NoStrategy
        } else {
            FailureReason::Exhausted
        };
        Err(self.fail(url, reason, attempts, started))
    }

    fn succeed(
        &self,
        url: &str,
        strategy: &str,
        record: NormalizedRecord,
        attempts: Vec<AttemptRecord>,
        started: Instant,
    ) -> ExtractionReport {
        let total_ms = millis(started.elapsed());
        info!(
            strategy,
            quality = ?record.quality,
            attempts = attempts.len(),
            total_ms,
            "extraction succeeded"
        );
        self.events.emit(ExtractionEvent::ExtractionSucceeded {
            url: url.to_string(),
            strategy: strategy.to_string(),
            quality: record.quality,
            attempts: attempts.len(),
            total_ms,
        });
        ExtractionReport {
            record,
            strategy: strategy.to_string(),
            attempts,
            total_ms,
        }
    }

    fn fail(
        &self,
        url: &str,
        reason: FailureReason,
        attempts: Vec<AttemptRecord>,
        started: Instant,
    ) -> AggregateExtractionError {
        let total_ms = millis(started.elapsed());
        info!(%reason, attempts = attempts.len(), total_ms, "extraction failed");
        self.events.emit(ExtractionEvent::ExtractionFailed {
            url: url.to_string(),
            reason,
            attempts: attempts.len(),
            total_ms,
        });
        AggregateExtractionError {
            url: url.to_string(),
            reason,
            attempts,
        }
    }
}

fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}
