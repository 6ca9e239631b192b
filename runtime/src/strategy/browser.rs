// Copyright 2026 Marketlens Contributors
// SPDX-License-Identifier: Apache-2.0

//! Rendered-page strategy for listings whose fields only appear after
//! JavaScript runs.
//!
//! Borrows a browser from the pool, navigates, waits for the domain's load
//! signal, then reads the DOM with a query script. Metadata embedded in the
//! rendered HTML fills whatever the script missed.

use super::Strategy;
use crate::acquisition::structured::extract_structured_data;
use crate::config::ExtractionConfig;
use crate::error::ExtractionError;
use crate::normalize::{apply_specs, detect_currency, marketplace_from_url, parse_condition, parse_price};
use crate::pool::{BrowserLease, BrowserPool};
use crate::record::{NormalizedRecord, RecordBuilder};
use crate::renderer::RenderContext;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const NAME: &str = "browser";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);

/// Reads listing fields from the live DOM. Returns a JSON string.
const DOM_SCRIPT: &str = r#"
(() => {
    const text = (sel) => {
        for (const s of sel) {
            const el = document.querySelector(s);
            if (!el) continue;
            const v = (el.getAttribute('content') || el.innerText || el.textContent || '').trim();
            if (v) return v;
        }
        return null;
    };
    const attr = (sel, name) => {
        const el = document.querySelector(sel);
        return el ? el.getAttribute(name) : null;
    };
    try {
        const images = [];
        const pushImg = (src) => {
            if (!src) return;
            try {
                const abs = new URL(src, location.href).href;
                if (!abs.startsWith('data:') && !images.includes(abs)) images.push(abs);
            } catch (e) {}
        };
        pushImg(attr('meta[property="og:image"]', 'content'));
        document.querySelectorAll('[itemprop="image"], .ux-image-carousel img, #landingImage, [data-testid*="image"] img')
            .forEach(img => pushImg(img.getAttribute('src') || img.getAttribute('content') || img.getAttribute('data-src')));

        const specs = [];
        document.querySelectorAll('.ux-labels-values, dl > div, tr').forEach(row => {
            const k = row.querySelector('.ux-labels-values__labels, dt, th');
            const v = row.querySelector('.ux-labels-values__values, dd, td');
            if (!k || !v) return;
            const key = (k.innerText || '').replace(/:\s*$/, '').trim();
            const val = (v.innerText || '').trim();
            if (key && val && key.length < 60 && val.length < 200) specs.push([key, val]);
        });

        return JSON.stringify({
            title: text(['h1.x-item-title__mainTitle', '[itemprop="name"]', '#productTitle', '[data-testid*="title"]', 'h1', 'meta[property="og:title"]']),
            price: text(['[itemprop="price"]', '.x-price-primary', '#corePrice_feature_div .a-offscreen', '[data-testid*="price"]', '.price', 'meta[property="product:price:amount"]']),
            currency: attr('[itemprop="priceCurrency"]', 'content') || attr('meta[property="product:price:currency"]', 'content'),
            condition: text(['[itemprop="itemCondition"]', '.x-item-condition-text', '[data-testid*="condition"]', '.condition']),
            seller: text(['.x-sellercard-atf__info__about-seller', '[data-testid*="seller"]', '.seller-name', '#sellerProfileTriggerId']),
            description: text(['meta[name="description"]', '[itemprop="description"]']),
            images: images.slice(0, 24),
            specs: specs.slice(0, 80),
        });
    } catch (e) {
        return null;
    }
})()
"#;

/// What the DOM script reports.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DomListing {
    title: Option<String>,
    price: Option<String>,
    currency: Option<String>,
    condition: Option<String>,
    seller: Option<String>,
    description: Option<String>,
    images: Vec<String>,
    specs: Vec<(String, String)>,
}

pub struct BrowserStrategy {
    pool: Arc<BrowserPool>,
}

impl BrowserStrategy {
    pub fn new(pool: Arc<BrowserPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Strategy for BrowserStrategy {
    fn name(&self) -> &str {
        NAME
    }

    fn priority(&self) -> u32 {
        10
    }

    fn timeout(&self) -> Duration {
        DEFAULT_TIMEOUT
    }

    fn max_retries(&self) -> u32 {
        2
    }

    fn requests_per_minute(&self) -> u32 {
        10
    }

    async fn attempt(
        &self,
        url: &str,
        config: &ExtractionConfig,
    ) -> Result<NormalizedRecord, ExtractionError> {
        let started = Instant::now();
        let budget = config
            .override_for(NAME)
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_TIMEOUT);

        let mut lease = self.pool.acquire().await.map_err(|e| {
            let err: ExtractionError = e.into();
            err.with_url(url)
        })?;
        debug!(url, handle = lease.id(), "browser leased");

        let context = match lease.renderer().new_context().await {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!(handle = lease.id(), error = %e, "failed to open browser context");
                lease.mark_dead();
                self.pool.discard(lease).await;
                return Err(ExtractionError::network(format!("browser context failed: {e}")).with_url(url));
            }
        };

        let result = self
            .render_and_extract(context, &mut lease, url, config, budget, started)
            .await;

        if lease.handle().is_alive() {
            self.pool.release(lease).await;
        } else {
            self.pool.discard(lease).await;
        }
        result.map_err(|e| e.with_url(url))
    }
}

impl BrowserStrategy {
    async fn render_and_extract(
        &self,
        mut context: Box<dyn RenderContext>,
        lease: &mut BrowserLease,
        url: &str,
        config: &ExtractionConfig,
        budget: Duration,
        started: Instant,
    ) -> Result<NormalizedRecord, ExtractionError> {
        let remaining = || budget.saturating_sub(started.elapsed());

        let nav = match context.navigate(url, remaining().as_millis() as u64).await {
            Ok(nav) => nav,
            Err(e) => {
                let crashed = !lease.renderer().is_alive().await;
                let _ = context.close().await;
                if crashed {
                    lease.mark_dead();
                    return Err(ExtractionError::network(format!("browser crashed during navigation: {e}")));
                }
                return Err(ExtractionError::timeout(format!("navigation failed: {e}")));
            }
        };

        let host = super::host_of(&nav.final_url).unwrap_or_default();
        let rule = config.wait_rule_for(&host);
        if let Err(e) = context.wait_for(&rule, remaining()).await {
            debug!(url, ?rule, error = %e, "load signal not reached, reading page anyway");
        }

        let dom = match context.execute_js(DOM_SCRIPT).await {
            Ok(value) => value
                .as_str()
                .and_then(|s| serde_json::from_str::<DomListing>(s).ok()),
            Err(e) => {
                debug!(url, error = %e, "DOM script failed");
                None
            }
        };
        let html = context.get_html().await.ok();
        let _ = context.close().await;

        build_record(dom, html.as_deref(), &nav.final_url, url, config)
    }
}

/// Merge the DOM script's findings with metadata from the rendered HTML.
fn build_record(
    dom: Option<DomListing>,
    html: Option<&str>,
    final_url: &str,
    url: &str,
    config: &ExtractionConfig,
) -> Result<NormalizedRecord, ExtractionError> {
    let structured = html
        .map(|h| extract_structured_data(h, final_url))
        .filter(|sd| sd.has_product());

    if dom.is_none() && structured.is_none() {
        return Err(ExtractionError::parse("rendered page could not be parsed"));
    }

    let mut builder = RecordBuilder::new(marketplace_from_url(url));
    if let Some(sd) = &structured {
        sd.fill(&mut builder);
    }

    let dom = dom.unwrap_or_default();
    let currency = dom
        .currency
        .clone()
        .or_else(|| dom.price.as_deref().and_then(detect_currency));
    builder
        .title(dom.title.clone())
        .price(dom.price.as_deref().and_then(parse_price))
        .currency(currency)
        .condition(dom.condition.as_deref().and_then(parse_condition))
        .images(dom.images.iter().cloned())
        .seller(dom.seller.clone());

    let mut texts: Vec<&str> = dom
        .title
        .as_deref()
        .into_iter()
        .chain(dom.description.as_deref())
        .collect();
    let aspects: Vec<(&str, &str)> = dom
        .specs
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .chain(structured.iter().flat_map(|sd| sd.properties()))
        .collect();
    if let Some(sd) = &structured {
        texts.extend(sd.texts());
    }
    apply_specs(&mut builder, aspects, &texts);

    builder.finish(&config.mandatory_fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::record::{Condition, Quality};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    const URL: &str = "https://www.example-market.com/listing/42";

    fn dom(title: Option<&str>, price: Option<&str>) -> DomListing {
        DomListing {
            title: title.map(str::to_string),
            price: price.map(str::to_string),
            condition: Some("Pre-owned".into()),
            specs: vec![("Processor".into(), "Apple M1".into())],
            ..Default::default()
        }
    }

    #[test]
    fn test_dom_fields_build_record() {
        let rec = build_record(
            Some(dom(Some("MacBook Air 13 8GB RAM 256GB SSD"), Some("US $549.00"))),
            None,
            URL,
            URL,
            &ExtractionConfig::default(),
        )
        .unwrap();
        assert_eq!(rec.price, Decimal::from_str("549.00").ok());
        assert_eq!(rec.currency, "USD");
        assert_eq!(rec.condition, Condition::Used);
        assert_eq!(rec.specs.get("cpu").map(String::as_str), Some("Apple M1"));
        assert_eq!(rec.quality, Quality::Full);
    }

    #[test]
    fn test_rendered_html_fills_missing_dom_fields() {
        let html = r#"<script type="application/ld+json">
        {"@type": "Product", "name": "ThinkPad X1", "offers": {"price": "700", "priceCurrency": "EUR"}}
        </script>"#;
        let rec = build_record(
            Some(dom(None, None)),
            Some(html),
            URL,
            URL,
            &ExtractionConfig::default(),
        )
        .unwrap();
        assert_eq!(rec.title, "ThinkPad X1");
        assert_eq!(rec.currency, "EUR");
    }

    #[test]
    fn test_unparseable_page_is_parse_error() {
        let err = build_record(None, Some("<html></html>"), URL, URL, &ExtractionConfig::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseError);
    }

    #[test]
    fn test_missing_title_is_invalid_schema() {
        let err = build_record(
            Some(dom(None, Some("$10"))),
            None,
            URL,
            URL,
            &ExtractionConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSchema);
    }

    #[test]
    fn test_dom_script_payload_deserializes() {
        let payload = r#"{"title":"X","price":null,"currency":null,"condition":null,
            "seller":null,"description":null,"images":["https://a/1.jpg"],"specs":[["RAM","8 GB"]]}"#;
        let listing: DomListing = serde_json::from_str(payload).unwrap();
        assert_eq!(listing.specs, vec![("RAM".to_string(), "8 GB".to_string())]);
    }
}
