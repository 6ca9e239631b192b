// Copyright 2026 Marketlens Contributors
// SPDX-License-Identifier: Apache-2.0

//! Marketplace item API strategy (eBay Browse API).

use super::{Strategy, StrategySpec};
use crate::acquisition::http_client::HttpClient;
use crate::config::ExtractionConfig;
use crate::error::ExtractionError;
use crate::normalize::{apply_specs, marketplace_from_url, parse_condition, price_from_json};
use crate::record::{NormalizedRecord, RecordBuilder};
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

pub const NAME: &str = "api";

const MARKETPLACE: &str = "ebay";
const DEFAULT_BASE_URL: &str = "https://api.ebay.com";
const ITEM_PATH: &str = "/buy/browse/v1/item/get_item_by_legacy_id";

/// Calls the marketplace's structured item endpoint with a bearer token.
pub struct ApiStrategy {
    http: HttpClient,
}

impl ApiStrategy {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Strategy for ApiStrategy {
    fn name(&self) -> &str {
        NAME
    }

    fn priority(&self) -> u32 {
        1
    }

    fn domain_patterns(&self) -> &[&str] {
        &["*.ebay.*", "ebay.*"]
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    fn max_retries(&self) -> u32 {
        3
    }

    fn requests_per_minute(&self) -> u32 {
        100
    }

    async fn attempt(
        &self,
        url: &str,
        config: &ExtractionConfig,
    ) -> Result<NormalizedRecord, ExtractionError> {
        let Some(token) = config.credentials.get(MARKETPLACE) else {
            return Err(
                ExtractionError::disabled("no API credential configured for ebay").with_url(url),
            );
        };
        let item_id = legacy_item_id(url).ok_or_else(|| {
            ExtractionError::invalid_schema("no item id in listing URL").with_url(url)
        })?;

        let base = config
            .api_base_url
            .get(MARKETPLACE)
            .map(String::as_str)
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/');
        let endpoint = format!("{base}{ITEM_PATH}?legacy_item_id={item_id}");
        let auth = format!("Bearer {token}");
        let marketplace_id = marketplace_id_for(url);

        debug!(url, item_id, marketplace_id, "calling item API");
        let response = self
            .http
            .get(
                &endpoint,
                &[
                    ("authorization", auth.as_str()),
                    ("x-ebay-c-marketplace-id", marketplace_id),
                    ("accept", "application/json"),
                ],
                StrategySpec::resolve(self, config).timeout,
            )
            .await
            .map_err(|e| e.with_url(url))?;

        let item: Value = serde_json::from_str(&response.body).map_err(|e| {
            ExtractionError::parse(format!("item API returned invalid JSON: {e}")).with_url(url)
        })?;

        record_from_item(&item, url, config).map_err(|e| e.with_url(url))
    }
}

/// Numeric listing id from `/itm/<id>` or `/itm/<slug>/<id>`.
pub fn legacy_item_id(url: &str) -> Option<String> {
    static ITEM_ID: OnceLock<Regex> = OnceLock::new();
    let re = ITEM_ID.get_or_init(|| {
        Regex::new(r"/itm/(?:[^/?#]+/)?(\d{6,})(?:[/?#]|$)").expect("item id regex is valid")
    });
    let path = url::Url::parse(url).ok()?;
    re.captures(path.path())
        .or_else(|| re.captures(url))
        .map(|c| c[1].to_string())
}

/// `X-EBAY-C-MARKETPLACE-ID` for the listing's site.
fn marketplace_id_for(url: &str) -> &'static str {
    let host = super::host_of(url).unwrap_or_default();
    match host.rsplit('.').next().unwrap_or("") {
        "uk" => "EBAY_GB",
        "de" => "EBAY_DE",
        "fr" => "EBAY_FR",
        "it" => "EBAY_IT",
        "es" => "EBAY_ES",
        "au" => "EBAY_AU",
        "ca" => "EBAY_CA",
        _ => "EBAY_US",
    }
}

/// Map a Browse API item payload onto a record.
pub fn record_from_item(
    item: &Value,
    url: &str,
    config: &ExtractionConfig,
) -> Result<NormalizedRecord, ExtractionError> {
    let text = |v: &Value, key: &str| v.get(key).and_then(Value::as_str).map(str::to_string);

    let mut builder = RecordBuilder::new(marketplace_from_url(url));
    let price = item.get("price");
    builder
        .title(text(item, "title"))
        .price(price.and_then(|p| p.get("value")).and_then(price_from_json))
        .currency(price.and_then(|p| text(p, "currency")))
        .condition(text(item, "condition").and_then(|c| parse_condition(&c)))
        .image(item.get("image").and_then(|i| text(i, "imageUrl")))
        .images(
            item.get("additionalImages")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(|i| text(i, "imageUrl")),
        )
        .seller(item.get("seller").and_then(|s| text(s, "username")));

    let aspects: Vec<(&str, &str)> = item
        .get("localizedAspects")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|a| {
            Some((
                a.get("name").and_then(Value::as_str)?,
                a.get("value").and_then(Value::as_str)?,
            ))
        })
        .collect();
    let title = text(item, "title").unwrap_or_default();
    let description = text(item, "shortDescription").unwrap_or_default();
    apply_specs(&mut builder, aspects, &[title.as_str(), description.as_str()]);

    builder.finish(&config.mandatory_fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::record::{Condition, Quality};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    #[test]
    fn test_legacy_item_id() {
        assert_eq!(
            legacy_item_id("https://www.ebay.com/itm/123456789012").as_deref(),
            Some("123456789012")
        );
        assert_eq!(
            legacy_item_id("https://www.ebay.co.uk/itm/dell-xps-13/234567890123?hash=abc").as_deref(),
            Some("234567890123")
        );
        assert_eq!(legacy_item_id("https://www.ebay.com/sch/i.html?_nkw=laptop"), None);
    }

    #[test]
    fn test_marketplace_id_from_tld() {
        assert_eq!(marketplace_id_for("https://www.ebay.co.uk/itm/1"), "EBAY_GB");
        assert_eq!(marketplace_id_for("https://www.ebay.de/itm/1"), "EBAY_DE");
        assert_eq!(marketplace_id_for("https://www.ebay.com/itm/1"), "EBAY_US");
    }

    #[test]
    fn test_record_from_item() {
        let item = serde_json::json!({
            "itemId": "v1|123456789012|0",
            "title": "Lenovo ThinkPad T14 Gen 2",
            "price": {"value": "419.99", "currency": "USD"},
            "condition": "Used",
            "image": {"imageUrl": "https://i.ebayimg.com/1.jpg"},
            "additionalImages": [
                {"imageUrl": "https://i.ebayimg.com/2.jpg"},
                {"imageUrl": "https://i.ebayimg.com/1.jpg"}
            ],
            "seller": {"username": "it_refurb_store"},
            "localizedAspects": [
                {"type": "STRING", "name": "Processor", "value": "Intel Core i5-1135G7"},
                {"type": "STRING", "name": "RAM Size", "value": "16 GB"},
                {"type": "STRING", "name": "Color", "value": "Black"}
            ]
        });
        let rec = record_from_item(
            &item,
            "https://www.ebay.com/itm/123456789012",
            &ExtractionConfig::default(),
        )
        .unwrap();
        assert_eq!(rec.title, "Lenovo ThinkPad T14 Gen 2");
        assert_eq!(rec.price, Decimal::from_str("419.99").ok());
        assert_eq!(rec.currency, "USD");
        assert_eq!(rec.condition, Condition::Used);
        assert_eq!(rec.images.len(), 2);
        assert_eq!(rec.seller.as_deref(), Some("it_refurb_store"));
        assert_eq!(rec.marketplace, "ebay");
        assert_eq!(rec.specs.get("cpu").map(String::as_str), Some("Intel Core i5-1135G7"));
        assert_eq!(rec.specs.get("color").map(String::as_str), Some("Black"));
        assert_eq!(rec.quality, Quality::Full);
    }

    #[test]
    fn test_item_without_title_is_invalid() {
        let item = serde_json::json!({"price": {"value": "10.00", "currency": "USD"}});
        let err = record_from_item(&item, "https://www.ebay.com/itm/1", &ExtractionConfig::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSchema);
    }

    #[tokio::test]
    async fn test_missing_credential_is_disabled_before_network() {
        let strategy = ApiStrategy::new(HttpClient::new());
        let mut config = ExtractionConfig::default();
        // Unroutable base: reaching the network would fail differently.
        config
            .api_base_url
            .insert(MARKETPLACE.into(), "http://127.0.0.1:9".into());
        if std::env::var(crate::config::token_env_var(MARKETPLACE)).is_ok() {
            return;
        }
        let err = strategy
            .attempt("https://www.ebay.com/itm/123456789012", &config)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AdapterDisabled);
    }
}
