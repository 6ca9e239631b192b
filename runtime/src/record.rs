// Copyright 2026 Marketlens Contributors
// SPDX-License-Identifier: Apache-2.0

//! The normalized product record every strategy produces.
//!
//! Records are only built through [`RecordBuilder::finish`], which enforces:
//! - the title is present and non-empty (otherwise `InvalidSchema`);
//! - `extraction_metadata` covers `title`, `price`, `condition` and every spec key;
//! - `quality` is `Partial` exactly when the price is absent or a mandatory
//!   field is missing.

use crate::error::ExtractionError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

pub const FIELD_TITLE: &str = "title";
pub const FIELD_PRICE: &str = "price";
pub const FIELD_CONDITION: &str = "condition";
pub const FIELD_CURRENCY: &str = "currency";

/// Item condition, collapsed to the vocabulary valuation understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    New,
    Used,
    Refurbished,
    #[default]
    Unknown,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Condition::New => "new",
            Condition::Used => "used",
            Condition::Refurbished => "refurbished",
            Condition::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Full,
    Partial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldStatus {
    Extracted,
    ExtractionFailed,
}

/// A marketplace listing, normalized for downstream valuation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub title: String,
    pub price: Option<Decimal>,
    pub currency: String,
    pub condition: Condition,
    pub images: Vec<String>,
    pub seller: Option<String>,
    pub marketplace: String,
    pub specs: BTreeMap<String, String>,
    pub quality: Quality,
    pub extraction_metadata: BTreeMap<String, FieldStatus>,
    pub missing_fields: BTreeSet<String>,
}

impl NormalizedRecord {
    pub fn is_partial(&self) -> bool {
        self.quality == Quality::Partial
    }
}

/// Accumulates fields as a strategy finds them.
///
/// Setters take `Option`s so strategies can pass lookups straight through;
/// a `None` is recorded as a failed extraction of that field.
#[derive(Debug, Clone, Default)]
pub struct RecordBuilder {
    marketplace: String,
    title: Option<String>,
    price: Option<Decimal>,
    currency: Option<String>,
    condition: Option<Condition>,
    images: Vec<String>,
    seller: Option<String>,
    specs: BTreeMap<String, String>,
    failed_specs: BTreeSet<String>,
}

impl RecordBuilder {
    pub fn new(marketplace: impl Into<String>) -> Self {
        Self {
            marketplace: marketplace.into(),
            ..Default::default()
        }
    }

    pub fn title(&mut self, title: Option<String>) -> &mut Self {
        if self.title.is_none() {
            self.title = title
                .map(|t| collapse_whitespace(&t))
                .filter(|t| !t.is_empty());
        }
        self
    }

    pub fn price(&mut self, price: Option<Decimal>) -> &mut Self {
        if self.price.is_none() {
            self.price = price.filter(|p| *p > Decimal::ZERO);
        }
        self
    }

    pub fn currency(&mut self, currency: Option<String>) -> &mut Self {
        if self.currency.is_none() {
            self.currency = currency
                .map(|c| c.trim().to_ascii_uppercase())
                .filter(|c| !c.is_empty());
        }
        self
    }

    pub fn condition(&mut self, condition: Option<Condition>) -> &mut Self {
        if self.condition.is_none() {
            self.condition = condition.filter(|c| *c != Condition::Unknown);
        }
        self
    }

    pub fn image(&mut self, image: Option<String>) -> &mut Self {
        if let Some(img) = image.map(|i| i.trim().to_string()) {
            if !img.is_empty() && !self.images.contains(&img) {
                self.images.push(img);
            }
        }
        self
    }

    pub fn images<I: IntoIterator<Item = String>>(&mut self, images: I) -> &mut Self {
        for img in images {
            self.image(Some(img));
        }
        self
    }

    pub fn seller(&mut self, seller: Option<String>) -> &mut Self {
        if self.seller.is_none() {
            self.seller = seller
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty());
        }
        self
    }

    /// Record a spec value. First writer wins; a later success clears an
    /// earlier failure for the same key.
    pub fn spec(&mut self, key: &str, value: Option<String>) -> &mut Self {
        let key = key.trim().to_ascii_lowercase();
        match value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
            Some(v) => {
                self.failed_specs.remove(&key);
                self.specs.entry(key).or_insert(v);
            }
            None => {
                if !self.specs.contains_key(&key) {
                    self.failed_specs.insert(key);
                }
            }
        }
        self
    }

    pub fn specs<I: IntoIterator<Item = (String, String)>>(&mut self, specs: I) -> &mut Self {
        for (k, v) in specs {
            self.spec(&k, Some(v));
        }
        self
    }

    pub fn has_price(&self) -> bool {
        self.price.is_some()
    }

    /// Seal the record. `mandatory` names fields whose absence makes the
    /// record partial in addition to the price.
    pub fn finish(self, mandatory: &BTreeSet<String>) -> Result<NormalizedRecord, ExtractionError> {
        let title = self
            .title
            .ok_or_else(|| ExtractionError::invalid_schema("listing title could not be extracted"))?;

        let mut metadata = BTreeMap::new();
        let mut missing = BTreeSet::new();
        let mut mark = |field: &str, ok: bool| {
            let status = if ok {
                FieldStatus::Extracted
            } else {
                missing.insert(field.to_string());
                FieldStatus::ExtractionFailed
            };
            metadata.insert(field.to_string(), status);
        };

        mark(FIELD_TITLE, true);
        mark(FIELD_PRICE, self.price.is_some());
        mark(FIELD_CONDITION, self.condition.is_some());
        if self.price.is_some() {
            mark(FIELD_CURRENCY, self.currency.is_some());
        }
        for key in self.specs.keys() {
            mark(key, true);
        }
        for key in &self.failed_specs {
            mark(key, false);
        }

        let mandatory_missing = mandatory.iter().any(|f| missing.contains(f));
        let quality = if self.price.is_none() || mandatory_missing {
            Quality::Partial
        } else {
            Quality::Full
        };

        Ok(NormalizedRecord {
            title,
            price: self.price,
            currency: self.currency.unwrap_or_default(),
            condition: self.condition.unwrap_or_default(),
            images: self.images,
            seller: self.seller,
            marketplace: self.marketplace,
            specs: self.specs,
            quality,
            extraction_metadata: metadata,
            missing_fields: missing,
        })
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
