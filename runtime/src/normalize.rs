// Copyright 2026 Marketlens Contributors
// SPDX-License-Identifier: Apache-2.0

//! Field-level normalization shared by every strategy: prices, currencies,
//! conditions, marketplace identifiers and hardware specs.

use crate::record::{Condition, RecordBuilder};
use regex::Regex;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::sync::OnceLock;

/// Spec keys valuation looks for. Each is recorded in the extraction
/// metadata as extracted or failed, whether or not a value was found.
pub const TRACKED_SPECS: &[&str] = &["cpu", "ram", "storage"];

// ── Prices ──────────────────────────────────────────────────────────────────

fn price_run_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\d[\d.,\u{00A0}\u{202F}']*").expect("price run regex is valid")
    })
}

/// Parse a human-formatted price (`"$1,299.99"`, `"1.299,99 €"`, `"EUR 35"`).
///
/// Returns `None` for text without digits and for non-positive amounts.
pub fn parse_price(text: &str) -> Option<Decimal> {
    let run = price_run_re().find(text)?.as_str();
    let digits: String = run
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    let digits = digits.trim_end_matches(['.', ',']);
    let dot_groups = detect_currency(text)
        .is_some_and(|c| DOT_GROUPING_CURRENCIES.contains(&c.as_str()));
    let normalized = normalize_separators(digits, dot_groups);
    Decimal::from_str(&normalized)
        .ok()
        .filter(|d| *d > Decimal::ZERO)
}

/// Currencies conventionally written with `.` as the thousands separator.
const DOT_GROUPING_CURRENCIES: &[&str] = &["EUR", "SEK", "NOK", "DKK", "PLN"];

/// Resolve thousands vs decimal separators. The right-most separator is the
/// decimal point when both kinds appear; a lone comma is decimal only when
/// followed by one or two digits. With `dot_groups`, a lone dot followed by
/// exactly three digits groups thousands (`1.299 €`).
fn normalize_separators(raw: &str, dot_groups: bool) -> String {
    match (raw.rfind('.'), raw.rfind(',')) {
        (Some(dot), Some(comma)) if dot > comma => raw.replace(',', ""),
        (Some(_), Some(_)) => raw.replace('.', "").replace(',', "."),
        (None, Some(comma)) => {
            let decimals = raw.len() - comma - 1;
            if raw.matches(',').count() == 1 && (1..=2).contains(&decimals) {
                raw.replace(',', ".")
            } else {
                raw.replace(',', "")
            }
        }
        (Some(_), None) if raw.matches('.').count() > 1 => raw.replace('.', ""),
        (Some(dot), None) if dot_groups && raw.len() - dot - 1 == 3 => raw.replace('.', ""),
        _ => raw.to_string(),
    }
}

/// Read a price out of a JSON value that may be a number or a string.
pub fn price_from_json(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok()
            .filter(|d| *d > Decimal::ZERO),
        Value::String(s) => parse_price(s),
        _ => None,
    }
}

fn currency_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(USD|EUR|GBP|CAD|AUD|JPY|CHF|SEK|NOK|DKK|PLN|INR|NZD)\b")
            .expect("currency code regex is valid")
    })
}

/// Detect an ISO 4217 currency from price text.
pub fn detect_currency(text: &str) -> Option<String> {
    if let Some(m) = currency_code_re().find(text) {
        return Some(m.as_str().to_string());
    }
    let upper = text.to_ascii_uppercase();
    let code = if upper.contains("C $") || upper.contains("CA$") || upper.contains("C$") {
        "CAD"
    } else if upper.contains("AU $") || upper.contains("A$") {
        "AUD"
    } else if text.contains('$') {
        "USD"
    } else if text.contains('\u{00A3}') {
        "GBP"
    } else if text.contains('\u{20AC}') {
        "EUR"
    } else if text.contains('\u{00A5}') {
        "JPY"
    } else {
        return None;
    };
    Some(code.to_string())
}

// ── Conditions ──────────────────────────────────────────────────────────────

fn new_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bnew\b").expect("new-word regex is valid"))
}

/// Map marketplace and schema.org condition vocabulary onto [`Condition`].
pub fn parse_condition(text: &str) -> Option<Condition> {
    let lower = text.trim().to_lowercase();
    // schema.org values arrive as URLs: https://schema.org/UsedCondition
    let term = lower.rsplit('/').next().unwrap_or(&lower);

    if term.contains("refurb") || term.contains("renewed") || term.contains("remanufactured") {
        return Some(Condition::Refurbished);
    }
    const USED: &[&str] = &[
        "usedcondition",
        "damagedcondition",
        "used",
        "pre-owned",
        "preowned",
        "second hand",
        "second-hand",
        "secondhand",
        "for parts",
        "open box",
        "open-box",
        "like new",
    ];
    if USED.iter().any(|u| term.contains(u)) {
        return Some(Condition::Used);
    }
    if term.contains("newcondition") || new_word_re().is_match(term) {
        return Some(Condition::New);
    }
    None
}

// ── Marketplace identifiers ─────────────────────────────────────────────────

/// Derive a marketplace identifier from a listing URL's host.
///
/// `https://www.ebay.co.uk/itm/1` → `"ebay"`. IP hosts are returned as-is.
pub fn marketplace_from_url(url: &str) -> String {
    let Some(host) = url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
    else {
        return "unknown".to_string();
    };
    if host.parse::<std::net::IpAddr>().is_ok() || !host.contains('.') {
        return host;
    }

    let mut labels: Vec<&str> = host.split('.').collect();
    let tld = labels.pop().unwrap_or_default();
    if tld.len() == 2 {
        if let Some(&second) = labels.last() {
            if matches!(second, "co" | "com" | "org" | "net" | "ac" | "ne" | "or") && labels.len() > 1
            {
                labels.pop();
            }
        }
    }
    labels
        .last()
        .map(|s| s.to_string())
        .unwrap_or_else(|| host.clone())
}

// ── Specs ───────────────────────────────────────────────────────────────────

struct SpecPatterns {
    cpu: Regex,
    ram: Regex,
    storage: Regex,
    gpu: Regex,
    screen: Regex,
}

fn spec_patterns() -> &'static SpecPatterns {
    static PATTERNS: OnceLock<SpecPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| SpecPatterns {
        cpu: Regex::new(
            r"(?i)\b(intel\s+core\s+(?:ultra\s+)?i?[3579][- ]?\d{3,5}[a-z]{0,2}|core\s+i[3579][- ]\d{3,5}[a-z]{0,2}|i[3579]-\d{3,5}[a-z]{0,2}|(?:amd\s+)?ryzen\s+[3579]\s+(?:pro\s+)?\d{4}[a-z]{0,2}|apple\s+m[1-4](?:\s+(?:pro|max|ultra))?|intel\s+(?:celeron|pentium|xeon)\s+[a-z0-9-]+)",
        )
        .expect("cpu regex is valid"),
        ram: Regex::new(r"(?i)\b(\d{1,3})\s?gb\s*(?:(?:ddr\d|lpddr\d)x?\s*)?(?:ram|memory)\b")
            .expect("ram regex is valid"),
        storage: Regex::new(r"(?i)\b(\d{1,4})\s?(gb|tb)\s*(?:ssd|hdd|nvme|emmc|storage|hard drive)\b")
            .expect("storage regex is valid"),
        gpu: Regex::new(r"(?i)\b((?:nvidia\s+)?(?:geforce\s+)?(?:rtx|gtx)\s?\d{3,4}(?:\s?ti)?|(?:amd\s+)?radeon\s+rx\s?\d{3,4}(?:\s?xt)?)\b")
            .expect("gpu regex is valid"),
        screen: Regex::new(r#"(?i)\b(\d{2}(?:\.\d)?)\s?(?:"|''|-?\s?inch|in\b)"#)
            .expect("screen regex is valid"),
    })
}

/// Pull hardware specs out of free text (titles, descriptions).
pub fn extract_specs(text: &str) -> Vec<(String, String)> {
    let p = spec_patterns();
    let mut out = Vec::new();

    if let Some(m) = p.cpu.find(text) {
        out.push(("cpu".to_string(), collapse(m.as_str())));
    }
    if let Some(c) = p.ram.captures(text) {
        out.push(("ram".to_string(), format!("{}GB", &c[1])));
    }
    if let Some(c) = p.storage.captures(text) {
        let kind = c
            .get(0)
            .map(|m| m.as_str().to_ascii_uppercase())
            .map(|s| {
                if s.contains("HDD") || s.contains("HARD DRIVE") {
                    " HDD"
                } else if s.contains("SSD") || s.contains("NVME") {
                    " SSD"
                } else {
                    ""
                }
            })
            .unwrap_or("");
        out.push((
            "storage".to_string(),
            format!("{}{}{kind}", &c[1], c[2].to_ascii_uppercase()),
        ));
    }
    if let Some(m) = p.gpu.find(text) {
        out.push(("gpu".to_string(), collapse(m.as_str())));
    }
    if let Some(c) = p.screen.captures(text) {
        out.push(("screen_size".to_string(), format!("{}\"", &c[1])));
    }
    out
}

/// Map a marketplace "item specifics" label onto a spec key.
pub fn aspect_key(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    let key = match lower.as_str() {
        "processor" | "processor model" | "cpu" | "processor type" => "cpu",
        "ram" | "ram size" | "memory" | "system memory" | "installed ram" => "ram",
        "ssd capacity" | "hard drive capacity" | "storage" | "storage capacity"
        | "storage type capacity" => "storage",
        "gpu" | "graphics processing type" | "graphics card" | "gpu model" => "gpu",
        "screen size" | "display size" => "screen_size",
        _ => {
            return lower
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect::<String>()
                .split('_')
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("_");
        }
    };
    key.to_string()
}

/// Fill a builder's specs from explicit aspects first, then from free text,
/// then mark every tracked spec that is still absent as failed.
pub fn apply_specs<'a, I>(builder: &mut RecordBuilder, aspects: I, texts: &[&str])
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    for (name, value) in aspects {
        let key = aspect_key(name);
        if !key.is_empty() {
            builder.spec(&key, Some(value.to_string()));
        }
    }
    for text in texts {
        for (k, v) in extract_specs(text) {
            builder.spec(&k, Some(v));
        }
    }
    for key in TRACKED_SPECS {
        builder.spec(key, None);
    }
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
