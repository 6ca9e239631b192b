// Copyright 2026 Marketlens Contributors
// SPDX-License-Identifier: Apache-2.0

//! JSONL audit log of extraction telemetry.
//!
//! - One line per [`ExtractionEvent`], stamped with the time it was written
//! - Rotation when the file exceeds the size limit (default 50 MB)
//! - Rotated files named `.1`, `.2`, etc. (max 5 rotations)

use crate::events::{now_timestamp, ExtractionEvent};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;
use tracing::warn;

const DEFAULT_MAX_LOG_SIZE: u64 = 50 * 1024 * 1024;

const MAX_ROTATIONS: u32 = 5;

#[derive(Serialize)]
struct AuditLine<'a> {
    logged_at: String,
    #[serde(flatten)]
    event: &'a ExtractionEvent,
}

/// Append-only JSONL audit logger with size-based rotation.
pub struct AuditLogger {
    file: File,
    path: PathBuf,
    current_size: u64,
    max_size: u64,
}

impl AuditLogger {
    /// Open or create the audit log file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let file = open_append(path)?;
        let current_size = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            file,
            path: path.to_path_buf(),
            current_size,
            max_size: DEFAULT_MAX_LOG_SIZE,
        })
    }

    /// Open the default audit log at ~/.marketlens/audit.jsonl.
    pub fn default_logger() -> Result<Self> {
        Self::open(&default_path())
    }

    pub fn with_max_size(mut self, bytes: u64) -> Self {
        self.max_size = bytes;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log(&mut self, event: &ExtractionEvent) -> Result<()> {
        if self.current_size >= self.max_size {
            self.rotate()?;
        }

        let json = serde_json::to_string(&AuditLine {
            logged_at: now_timestamp(),
            event,
        })?;
        writeln!(self.file, "{json}").context("failed to write audit line")?;
        self.current_size += json.len() as u64 + 1;
        Ok(())
    }

    /// Drain `rx` into the log until the bus closes. Lagged events are
    /// counted and reported, not fatal. File writes run on the blocking
    /// pool, one batch of queued events at a time.
    pub async fn run(mut self, mut rx: broadcast::Receiver<ExtractionEvent>) -> Result<()> {
        loop {
            let mut batch = match rx.recv().await {
                Ok(event) => vec![event],
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "audit log fell behind the event bus");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            loop {
                match rx.try_recv() {
                    Ok(event) => batch.push(event),
                    Err(broadcast::error::TryRecvError::Lagged(n)) => {
                        warn!(skipped = n, "audit log fell behind the event bus");
                    }
                    Err(_) => break,
                }
            }

            self = tokio::task::spawn_blocking(move || {
                for event in &batch {
                    if let Err(e) = self.log(event) {
                        warn!(error = %e, "audit log write failed");
                    }
                }
                self
            })
            .await
            .context("audit writer task failed")?;
        }
        tokio::task::spawn_blocking(move || self.file.flush())
            .await
            .context("audit writer task failed")??;
        Ok(())
    }

    /// Rotate log files: audit.jsonl → audit.jsonl.1, .1 → .2, etc.
    fn rotate(&mut self) -> Result<()> {
        self.file.flush()?;

        let oldest = rotation_path(&self.path, MAX_ROTATIONS);
        if oldest.exists() {
            let _ = std::fs::remove_file(&oldest);
        }
        for i in (1..MAX_ROTATIONS).rev() {
            let from = rotation_path(&self.path, i);
            if from.exists() {
                let _ = std::fs::rename(&from, rotation_path(&self.path, i + 1));
            }
        }
        let _ = std::fs::rename(&self.path, rotation_path(&self.path, 1));

        self.file = open_append(&self.path).context("failed to reopen audit log after rotation")?;
        self.current_size = 0;
        Ok(())
    }
}

pub fn default_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".marketlens")
        .join("audit.jsonl")
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open audit log: {}", path.display()))
}

/// Build path for a rotated log file: `audit.jsonl.1`, `audit.jsonl.2`, etc.
fn rotation_path(base: &Path, index: u32) -> PathBuf {
    let name = format!(
        "{}.{index}",
        base.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audit.jsonl")
    );
    base.with_file_name(name)
}
