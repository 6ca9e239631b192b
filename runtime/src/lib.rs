// Copyright 2026 Marketlens Contributors
// SPDX-License-Identifier: Apache-2.0

//! Marketlens runtime: marketplace listing extraction.
//!
//! Turns a listing URL into a [`record::NormalizedRecord`] by walking a
//! priority-ordered chain of extraction strategies (marketplace API,
//! embedded page metadata, rendered page) under retry, rate-limit and
//! browser-pool policy. [`router::Router`] is the entry point.

pub mod acquisition;
pub mod attempt;
pub mod audit;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod normalize;
pub mod pool;
pub mod rate_limit;
pub mod record;
pub mod renderer;
pub mod retry;
pub mod router;
pub mod stealth;
pub mod strategy;

pub use config::ExtractionConfig;
pub use error::{AggregateExtractionError, ErrorKind, ExtractionError};
pub use record::NormalizedRecord;
pub use router::{ExtractionReport, Router};
