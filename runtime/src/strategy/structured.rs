// Copyright 2026 Marketlens Contributors
// SPDX-License-Identifier: Apache-2.0

//! Static-HTML strategy: one GET, then JSON-LD / microdata / OpenGraph.

use super::{Strategy, StrategySpec};
use crate::acquisition::http_client::HttpClient;
use crate::acquisition::structured::{extract_structured_data, StructuredData};
use crate::config::ExtractionConfig;
use crate::error::ExtractionError;
use crate::normalize::{apply_specs, marketplace_from_url};
use crate::record::{NormalizedRecord, RecordBuilder};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

pub const NAME: &str = "structured_metadata";

pub struct StructuredMetadataStrategy {
    http: HttpClient,
}

impl StructuredMetadataStrategy {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Strategy for StructuredMetadataStrategy {
    fn name(&self) -> &str {
        NAME
    }

    fn priority(&self) -> u32 {
        5
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(6)
    }

    fn max_retries(&self) -> u32 {
        2
    }

    fn requests_per_minute(&self) -> u32 {
        30
    }

    async fn attempt(
        &self,
        url: &str,
        config: &ExtractionConfig,
    ) -> Result<NormalizedRecord, ExtractionError> {
        let response = self
            .http
            .get(
                url,
                &[("accept", "text/html,application/xhtml+xml")],
                StrategySpec::resolve(self, config).timeout,
            )
            .await?;

        let data = extract_structured_data(&response.body, &response.final_url);
        debug!(
            url,
            products = data.products.len(),
            jsonld = data.has_jsonld,
            microdata = data.has_microdata,
            opengraph = data.has_opengraph,
            "parsed page metadata"
        );
        record_from_structured(&data, url, config).map_err(|e| e.with_url(url))
    }
}

/// Build a record from parsed page metadata. Shared with the browser
/// strategy's rendered-HTML fallback.
pub fn record_from_structured(
    data: &StructuredData,
    url: &str,
    config: &ExtractionConfig,
) -> Result<NormalizedRecord, ExtractionError> {
    if !data.has_product() {
        return Err(ExtractionError::invalid_schema(
            "no product metadata block found",
        ));
    }
    let mut builder = RecordBuilder::new(marketplace_from_url(url));
    data.fill(&mut builder);
    apply_specs(&mut builder, data.properties(), &data.texts());
    builder.finish(&config.mandatory_fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::record::Quality;

    #[test]
    fn test_no_product_block_is_invalid_schema() {
        let data = extract_structured_data("<html><title>Blog</title></html>", "https://x.test/");
        let err = record_from_structured(&data, "https://x.test/", &ExtractionConfig::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSchema);
    }

    #[test]
    fn test_specs_from_title() {
        let html = r#"<script type="application/ld+json">
        {"@type": "Product", "name": "HP EliteBook 840 G8 i5-1145G7 16GB RAM 256GB SSD",
         "offers": {"price": "389.00", "priceCurrency": "GBP", "itemCondition": "https://schema.org/RefurbishedCondition"}}
        </script>"#;
        let data = extract_structured_data(html, "https://www.backmarket.co.uk/p/1");
        let rec = record_from_structured(
            &data,
            "https://www.backmarket.co.uk/p/1",
            &ExtractionConfig::default(),
        )
        .unwrap();
        assert_eq!(rec.marketplace, "backmarket");
        assert_eq!(rec.quality, Quality::Full);
        assert_eq!(rec.specs.get("ram").map(String::as_str), Some("16GB"));
        assert!(rec.specs.contains_key("cpu"));
        assert!(rec.specs.contains_key("storage"));
    }
}
