// Copyright 2026 Marketlens Contributors
// SPDX-License-Identifier: Apache-2.0

//! Marketlens event bus: typed telemetry from the router and the pool.
//!
//! The EventBus is a `tokio::sync::broadcast` channel that carries
//! [`ExtractionEvent`] values. Observability sinks (the audit log, a
//! metrics exporter) subscribe independently. When no subscribers exist,
//! events are silently dropped.

use crate::attempt::{AttemptOutcome, AttemptRecord};
use crate::error::{ErrorKind, FailureReason};
use crate::record::Quality;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Pool operations reported to telemetry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolOp {
    Acquire,
    Release,
    Discard,
    Create,
}

/// Every event Marketlens emits.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExtractionEvent {
    // ── Router ────────────────────────────
    /// An extraction call began; `strategies` is the ordered chain.
    ExtractionStarted {
        url: String,
        strategies: Vec<String>,
        timestamp: String,
    },
    /// A strategy was passed over because configuration disabled it.
    StrategySkipped {
        url: String,
        strategy: String,
        reason: String,
    },
    /// One try of one strategy finished.
    AttemptFinished {
        strategy: String,
        url: String,
        outcome: AttemptOutcome,
        duration_ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_kind: Option<ErrorKind>,
        retry: u32,
    },
    ExtractionSucceeded {
        url: String,
        strategy: String,
        quality: Quality,
        attempts: usize,
        total_ms: u64,
    },
    ExtractionFailed {
        url: String,
        reason: FailureReason,
        attempts: usize,
        total_ms: u64,
    },

    // ── Browser pool ──────────────────────
    Pool {
        event: PoolOp,
        handle_id: String,
        pool_size: usize,
        in_use_count: usize,
    },
}

impl ExtractionEvent {
    pub fn attempt(record: &AttemptRecord) -> Self {
        ExtractionEvent::AttemptFinished {
            strategy: record.strategy.clone(),
            url: record.url.clone(),
            outcome: record.outcome,
            duration_ms: record.duration_ms,
            error_kind: record.error_kind(),
            retry: record.retry,
        }
    }

    /// The listing URL this event concerns, if any.
    pub fn url(&self) -> Option<&str> {
        match self {
            ExtractionEvent::ExtractionStarted { url, .. }
            | ExtractionEvent::StrategySkipped { url, .. }
            | ExtractionEvent::AttemptFinished { url, .. }
            | ExtractionEvent::ExtractionSucceeded { url, .. }
            | ExtractionEvent::ExtractionFailed { url, .. } => Some(url),
            ExtractionEvent::Pool { .. } => None,
        }
    }
}

/// The central event bus. Cloning shares the underlying channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ExtractionEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers. Silently ignores if no subscribers.
    pub fn emit(&self, event: ExtractionEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<ExtractionEvent> {
        self.sender.subscribe()
    }
}

/// RFC 3339 timestamp for the current time.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractionError;
    use std::time::Duration;

    #[test]
    fn test_attempt_event_shape() {
        let record = AttemptRecord::failed(
            "structured_metadata",
            "https://shop.example.com/p/1",
            ExtractionError::not_found("404"),
            Duration::from_millis(42),
            0,
        );
        let json = serde_json::to_value(ExtractionEvent::attempt(&record)).unwrap();
        assert_eq!(json["type"], "AttemptFinished");
        assert_eq!(json["strategy"], "structured_metadata");
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["duration_ms"], 42);
        assert_eq!(json["error_kind"], "item_not_found");
    }

    #[test]
    fn test_success_attempt_omits_error_kind() {
        let record = AttemptRecord::succeeded("api", "https://www.ebay.com/itm/1", Duration::ZERO, 0);
        let json = serde_json::to_value(ExtractionEvent::attempt(&record)).unwrap();
        assert!(json.get("error_kind").is_none());
    }

    #[test]
    fn test_pool_event_shape() {
        let json = serde_json::to_value(ExtractionEvent::Pool {
            event: PoolOp::Discard,
            handle_id: "browser-1".into(),
            pool_size: 2,
            in_use_count: 1,
        })
        .unwrap();
        assert_eq!(json["type"], "Pool");
        assert_eq!(json["event"], "discard");
        assert_eq!(json["pool_size"], 2);
        assert_eq!(json["in_use_count"], 1);
    }

    #[test]
    fn test_event_bus_emit_no_subscribers() {
        let bus = EventBus::new(16);
        bus.emit(ExtractionEvent::StrategySkipped {
            url: "https://example.com".into(),
            strategy: "api".into(),
            reason: "disabled by configuration".into(),
        });
    }

    #[test]
    fn test_event_bus_subscribe_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.clone().emit(ExtractionEvent::ExtractionStarted {
            url: "https://test.com/p/1".into(),
            strategies: vec!["browser".into()],
            timestamp: now_timestamp(),
        });
        let event = rx.try_recv().unwrap();
        assert_eq!(event.url(), Some("https://test.com/p/1"));
    }
}
