// Copyright 2026 Marketlens Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP acquisition for the strategies that never open a browser.
//!
//! `http_client` performs single, classified GET requests; `structured`
//! reads product metadata out of the returned HTML.

pub mod http_client;
pub mod structured;
