// Copyright 2026 Marketlens Contributors
// SPDX-License-Identifier: Apache-2.0

//! Terminal output helpers shared by the subcommands.
//!
//! Global flags are published through environment variables by `main` so
//! every command can check them without threading arguments around.

use crate::attempt::{AttemptOutcome, AttemptRecord};
use crate::record::NormalizedRecord;
use crate::router::ExtractionReport;
use serde::Serialize;

pub const JSON_ENV: &str = "MARKETLENS_JSON";
pub const QUIET_ENV: &str = "MARKETLENS_QUIET";
pub const VERBOSE_ENV: &str = "MARKETLENS_VERBOSE";

fn flag(name: &str) -> bool {
    std::env::var(name).is_ok_and(|v| v == "1")
}

pub fn is_json() -> bool {
    flag(JSON_ENV)
}

pub fn is_quiet() -> bool {
    flag(QUIET_ENV)
}

pub fn is_verbose() -> bool {
    flag(VERBOSE_ENV)
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("  Error: failed to serialize output: {e}"),
    }
}

pub fn print_report(report: &ExtractionReport) {
    if is_json() {
        print_json(report);
        return;
    }
    print!("{}", render_record(&report.record));
    println!();
    println!(
        "  Source:   {} ({} attempt(s), {}ms)",
        report.strategy,
        report.attempts.len(),
        report.total_ms
    );
    if is_verbose() {
        print!("{}", render_attempts(&report.attempts));
    }
}

/// Human-readable record summary.
pub fn render_record(rec: &NormalizedRecord) -> String {
    let mut out = String::new();
    let price = match rec.price {
        Some(p) if rec.currency.is_empty() => p.to_string(),
        Some(p) => format!("{p} {}", rec.currency),
        None => "(not found)".to_string(),
    };
    out.push_str(&format!("  {}\n", rec.title));
    out.push_str(&format!("  Price:     {price}\n"));
    out.push_str(&format!("  Condition: {}\n", rec.condition));
    out.push_str(&format!("  Market:    {}\n", rec.marketplace));
    if let Some(seller) = &rec.seller {
        out.push_str(&format!("  Seller:    {seller}\n"));
    }
    if !rec.images.is_empty() {
        out.push_str(&format!("  Images:    {}\n", rec.images.len()));
    }
    for (k, v) in &rec.specs {
        out.push_str(&format!("  {:<10} {v}\n", format!("{k}:")));
    }
    if rec.is_partial() {
        let missing: Vec<&str> = rec.missing_fields.iter().map(String::as_str).collect();
        out.push_str(&format!("  [partial] missing: {}\n", missing.join(", ")));
    }
    out
}

/// One line per try.
pub fn render_attempts(attempts: &[AttemptRecord]) -> String {
    let mut out = String::new();
    for a in attempts {
        let mark = match a.outcome {
            AttemptOutcome::Succeeded => "OK",
            AttemptOutcome::Failed => "!!",
            AttemptOutcome::Skipped => "--",
        };
        let detail = a
            .error
            .as_ref()
            .map(|e| format!(": {e}"))
            .unwrap_or_default();
        out.push_str(&format!(
            "  [{mark}] {} try {} ({}ms){detail}\n",
            a.strategy,
            a.retry + 1,
            a.duration_ms
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractionError;
    use crate::record::RecordBuilder;
    use std::collections::BTreeSet;
    use std::time::Duration;

    #[test]
    fn test_render_partial_record() {
        let mut b = RecordBuilder::new("ebay");
        b.title(Some("Surface Pro 7".into()));
        let rec = b.finish(&BTreeSet::new()).unwrap();
        let text = render_record(&rec);
        assert!(text.contains("Surface Pro 7"));
        assert!(text.contains("(not found)"));
        assert!(text.contains("[partial] missing:"));
    }

    #[test]
    fn test_render_attempts() {
        let url = "https://www.ebay.com/itm/1";
        let attempts = vec![
            AttemptRecord::failed(
                "api",
                url,
                ExtractionError::disabled("no credential"),
                Duration::from_millis(0),
                0,
            ),
            AttemptRecord::succeeded("structured_metadata", url, Duration::from_millis(120), 0),
        ];
        let text = render_attempts(&attempts);
        assert!(text.contains("[--] api try 1"));
        assert!(text.contains("[OK] structured_metadata try 1 (120ms)"));
    }
}
