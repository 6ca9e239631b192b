// Copyright 2026 Marketlens Contributors
// SPDX-License-Identifier: Apache-2.0

//! Token-bucket rate limiting, one bucket per key.
//!
//! Buckets hold up to `requests_per_minute` tokens and refill continuously.
//! Acquisition never waits: an empty bucket is reported to the caller, who
//! turns it into a retryable `RateLimited` attempt.

use crate::config::RateLimitScope;
use dashmap::DashMap;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Bucket {
    capacity: f64,
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn full(capacity: f64, now: Instant) -> Self {
        Self {
            capacity,
            tokens: capacity,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.capacity / 60.0).min(self.capacity);
        if now > self.last_refill {
            self.last_refill = now;
        }
    }

    fn wait_for_token(&self) -> Duration {
        let deficit = (1.0 - self.tokens).max(0.0);
        Duration::from_secs_f64(deficit * 60.0 / self.capacity)
    }
}

/// Process-wide limiter shared by every extraction call.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: DashMap<String, Bucket>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take one token from `key`'s bucket.
    ///
    /// On failure returns how long until the next token is available.
    pub fn try_acquire(&self, key: &str, requests_per_minute: u32) -> Result<(), Duration> {
        self.try_acquire_at(key, requests_per_minute, Instant::now())
    }

    pub fn try_acquire_at(
        &self,
        key: &str,
        requests_per_minute: u32,
        now: Instant,
    ) -> Result<(), Duration> {
        let capacity = f64::from(requests_per_minute.max(1));
        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket::full(capacity, now));

        bucket.refill(now);
        if bucket.capacity != capacity {
            // Limit changed via config; keep the current fill, clamp to the new size.
            bucket.capacity = capacity;
            bucket.tokens = bucket.tokens.min(capacity);
        }

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            Err(bucket.wait_for_token())
        }
    }
}

/// Build the bucket key for a strategy attempt against `url`.
pub fn bucket_key(strategy: &str, url: &str, scope: RateLimitScope) -> String {
    match scope {
        RateLimitScope::PerStrategy => strategy.to_string(),
        RateLimitScope::PerStrategyAndDomain => {
            let host = url::Url::parse(url)
                .ok()
                .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
                .unwrap_or_default();
            format!("{strategy}@{host}")
        }
    }
}
