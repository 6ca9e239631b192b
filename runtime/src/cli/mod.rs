// Copyright 2026 Marketlens Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI subcommand implementations for the `marketlens` binary.

pub mod doctor;
pub mod extract_cmd;
pub mod output;
