// Copyright 2026 Marketlens Contributors
// SPDX-License-Identifier: Apache-2.0

//! Exponential backoff policy consulted by the router between tries of one
//! strategy. Strategies themselves never sleep or retry.
//!
//! | Try | Delay before it (base = 1 s, cap = 4 s) |
//! |-----|-----------------------------------------|
//! | 0   | none                                    |
//! | 1   | 1 s                                     |
//! | 2   | 2 s                                     |
//! | 3   | 4 s                                     |
//! | 4   | 4 s (capped)                            |

use crate::config::ExtractionConfig;
use crate::error::ExtractionError;
use std::time::Duration;

/// What the router should do after a failed try.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the given delay, then try the same strategy again.
    RetryAfter(Duration),
    /// The error is terminal; move on.
    Terminal,
    /// The try budget is spent; move on.
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ExtractionConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(config.retry_base_delay(), config.retry_max_delay())
    }

    /// Delay before try number `retry` (1 for the first retry).
    pub fn delay_for(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32 << (retry - 1).min(31);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Decide after `tries_made` tries (counting the one that just failed)
    /// out of a budget of `max_tries`.
    pub fn decide(&self, error: &ExtractionError, tries_made: u32, max_tries: u32) -> RetryDecision {
        if !error.is_retryable() {
            RetryDecision::Terminal
        } else if tries_made >= max_tries {
            RetryDecision::Exhausted
        } else {
            RetryDecision::RetryAfter(self.delay_for(tries_made))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(4))
    }

    #[test]
    fn test_backoff_schedule_is_capped() {
        let p = policy();
        assert_eq!(p.delay_for(0), Duration::ZERO);
        assert_eq!(p.delay_for(1), Duration::from_secs(1));
        assert_eq!(p.delay_for(2), Duration::from_secs(2));
        assert_eq!(p.delay_for(3), Duration::from_secs(4));
        assert_eq!(p.delay_for(4), Duration::from_secs(4));
        assert_eq!(p.delay_for(40), Duration::from_secs(4));
    }

    #[test]
    fn test_terminal_errors_never_retry() {
        let p = policy();
        let err = ExtractionError::invalid_schema("no product block");
        assert_eq!(p.decide(&err, 1, 5), RetryDecision::Terminal);
        let err = ExtractionError::not_found("gone");
        assert_eq!(p.decide(&err, 1, 5), RetryDecision::Terminal);
    }

    #[test]
    fn test_retryable_until_budget_spent() {
        let p = policy();
        let err = ExtractionError::timeout("navigation");
        assert_eq!(
            p.decide(&err, 1, 2),
            RetryDecision::RetryAfter(Duration::from_secs(1))
        );
        assert_eq!(p.decide(&err, 2, 2), RetryDecision::Exhausted);
    }

    #[test]
    fn test_max_never_below_base() {
        let p = RetryPolicy::new(Duration::from_secs(3), Duration::from_secs(1));
        assert_eq!(p.delay_for(1), Duration::from_secs(3));
    }
}
