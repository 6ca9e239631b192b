// Copyright 2026 Marketlens Contributors
// SPDX-License-Identifier: Apache-2.0

//! Append-only audit trail of extraction telemetry.

pub mod logger;

pub use logger::AuditLogger;
