// Copyright 2026 Marketlens Contributors
// SPDX-License-Identifier: Apache-2.0

//! Parse product metadata from raw HTML without DOM rendering.
//!
//! Reads JSON-LD `Product` blocks, schema.org microdata and OpenGraph
//! product tags using the `scraper` crate. Parsing is synchronous:
//! `scraper::Html` is not `Send` and must never be held across an await.

use crate::normalize::{detect_currency, parse_condition, parse_price, price_from_json};
use crate::record::{Condition, RecordBuilder};
use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

/// All product metadata extracted from a single HTML page.
#[derive(Debug, Clone, Default)]
pub struct StructuredData {
    /// Products from JSON-LD, then microdata, in document order.
    pub products: Vec<ProductData>,
    /// OpenGraph metadata.
    pub og: OpenGraphData,
    /// `<meta name="description">`.
    pub meta_description: Option<String>,
    pub has_jsonld: bool,
    pub has_opengraph: bool,
    pub has_microdata: bool,
}

/// One product description, whatever markup it came from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductData {
    pub name: Option<String>,
    pub description: Option<String>,
    pub brand: Option<String>,
    pub price: Option<Decimal>,
    pub price_currency: Option<String>,
    pub condition: Option<Condition>,
    pub images: Vec<String>,
    pub seller: Option<String>,
    /// `additionalProperty` name/value pairs.
    pub properties: Vec<(String, String)>,
}

/// OpenGraph metadata.
#[derive(Debug, Clone, Default)]
pub struct OpenGraphData {
    pub og_type: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub images: Vec<String>,
    pub price_amount: Option<String>,
    pub price_currency: Option<String>,
    pub condition: Option<String>,
}

impl OpenGraphData {
    fn is_product(&self) -> bool {
        self.og_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("product") || t.ends_with(".item"))
            || self.price_amount.is_some()
    }
}

impl StructuredData {
    /// Whether the page carries any recognizable product block.
    pub fn has_product(&self) -> bool {
        !self.products.is_empty() || self.og.is_product()
    }

    /// Feed every product field found into `builder`, most authoritative
    /// source first (JSON-LD, microdata, OpenGraph).
    pub fn fill(&self, builder: &mut RecordBuilder) {
        for p in &self.products {
            builder
                .title(p.name.clone())
                .price(p.price)
                .currency(p.price_currency.clone())
                .condition(p.condition)
                .images(p.images.iter().cloned())
                .seller(p.seller.clone());
            if let Some(brand) = &p.brand {
                builder.spec("brand", Some(brand.clone()));
            }
        }

        if self.og.is_product() || self.products.is_empty() {
            let og_price = self.og.price_amount.as_deref().and_then(parse_price);
            let og_currency = self
                .og
                .price_currency
                .clone()
                .or_else(|| self.og.price_amount.as_deref().and_then(detect_currency));
            builder
                .title(self.og.title.clone())
                .price(og_price)
                .currency(og_currency)
                .condition(self.og.condition.as_deref().and_then(parse_condition))
                .images(self.og.images.iter().cloned());
        }
    }

    /// Explicit key/value attributes across all products.
    pub fn properties(&self) -> impl Iterator<Item = (&str, &str)> {
        self.products
            .iter()
            .flat_map(|p| p.properties.iter())
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Free text worth mining for specs: names and descriptions.
    pub fn texts(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for p in &self.products {
            out.extend(p.name.as_deref());
            out.extend(p.description.as_deref());
        }
        out.extend(self.og.title.as_deref());
        out.extend(self.og.description.as_deref());
        out.extend(self.meta_description.as_deref());
        out
    }
}

/// Extract all product metadata from raw HTML.
pub fn extract_structured_data(html: &str, base_url: &str) -> StructuredData {
    let mut sd = StructuredData::default();
    let document = Html::parse_document(html);
    let base = url::Url::parse(base_url).ok();

    extract_jsonld(&document, base.as_ref(), &mut sd);
    extract_microdata(&document, base.as_ref(), &mut sd);
    extract_opengraph(&document, base.as_ref(), &mut sd);
    sd.meta_description = select_first(&document, r#"meta[name="description"]"#)
        .and_then(|el| el.value().attr("content").map(clean));

    sd
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn select_first<'a>(document: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    let sel = selector(css)?;
    document.select(&sel).next()
}

fn clean(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn resolve(base: Option<&url::Url>, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with("data:") {
        return None;
    }
    match base {
        Some(b) => b.join(href).ok().map(|u| u.to_string()),
        None => Some(href.to_string()),
    }
}

// ── JSON-LD extraction ──────────────────────────────────────────────────────

fn extract_jsonld(document: &Html, base: Option<&url::Url>, sd: &mut StructuredData) {
    let Some(sel) = selector(r#"script[type="application/ld+json"]"#) else {
        return;
    };
    for element in document.select(&sel) {
        let text = element.inner_html();
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        if let Ok(value) = serde_json::from_str::<Value>(text) {
            sd.has_jsonld = true;
            process_jsonld_value(&value, base, sd);
        }
    }
}

fn process_jsonld_value(value: &Value, base: Option<&url::Url>, sd: &mut StructuredData) {
    if let Some(items) = value.as_array() {
        for item in items {
            process_jsonld_value(item, base, sd);
        }
    } else if let Some(graph) = value.get("@graph").and_then(|g| g.as_array()) {
        for item in graph {
            process_jsonld_value(item, base, sd);
        }
    } else if is_product_type(value) {
        sd.products.push(parse_product(value, base));
    }
}

fn is_product_type(value: &Value) -> bool {
    let matches = |t: &str| {
        matches!(
            t.rsplit('/').next().unwrap_or(t),
            "Product" | "ProductGroup" | "IndividualProduct" | "ProductModel" | "Car" | "Vehicle"
        )
    };
    match value.get("@type") {
        Some(Value::String(t)) => matches(t),
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).any(matches),
        _ => false,
    }
}

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(|x| x.as_str()).map(clean).filter(|s| !s.is_empty())
}

/// Strings or `{ "name": .. }` objects.
fn name_field(v: &Value, key: &str) -> Option<String> {
    v.get(key)
        .and_then(|x| {
            x.get("name")
                .and_then(|n| n.as_str())
                .or_else(|| x.as_str())
        })
        .map(clean)
        .filter(|s| !s.is_empty())
}

fn parse_product(v: &Value, base: Option<&url::Url>) -> ProductData {
    let offer = v.get("offers").and_then(|o| match o {
        Value::Array(arr) => arr.first(),
        other => Some(other),
    });

    let (price, currency, offer_condition, seller) = match offer {
        Some(offer) => {
            let price = offer
                .get("price")
                .or_else(|| offer.get("lowPrice"))
                .or_else(|| offer.get("priceSpecification").and_then(|s| s.get("price")))
                .and_then(price_from_json);
            let currency = str_field(offer, "priceCurrency").or_else(|| {
                offer
                    .get("priceSpecification")
                    .and_then(|s| str_field(s, "priceCurrency"))
            });
            let condition = str_field(offer, "itemCondition").and_then(|c| parse_condition(&c));
            (price, currency, condition, name_field(offer, "seller"))
        }
        None => (None, None, None, None),
    };

    let condition = offer_condition
        .or_else(|| str_field(v, "itemCondition").and_then(|c| parse_condition(&c)));

    let images = match v.get("image") {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(arr)) => arr
            .iter()
            .filter_map(|i| i.as_str().or_else(|| i.get("url").and_then(|u| u.as_str())))
            .map(str::to_string)
            .collect(),
        Some(obj @ Value::Object(_)) => obj
            .get("url")
            .and_then(|u| u.as_str())
            .map(|s| vec![s.to_string()])
            .unwrap_or_default(),
        _ => Vec::new(),
    };

    let properties = v
        .get("additionalProperty")
        .and_then(|p| p.as_array())
        .map(|props| {
            props
                .iter()
                .filter_map(|p| {
                    let name = str_field(p, "name")?;
                    let value = match p.get("value") {
                        Some(Value::String(s)) => clean(s),
                        Some(Value::Number(n)) => n.to_string(),
                        _ => return None,
                    };
                    Some((name, value))
                })
                .collect()
        })
        .unwrap_or_default();

    ProductData {
        name: str_field(v, "name"),
        description: str_field(v, "description"),
        brand: name_field(v, "brand"),
        price,
        price_currency: currency,
        condition,
        images: images.iter().filter_map(|i| resolve(base, i)).collect(),
        seller,
        properties,
    }
}

// ── Microdata extraction (itemprop) ─────────────────────────────────────────

fn itemprop_text(el: &ElementRef<'_>) -> String {
    el.value()
        .attr("content")
        .map(clean)
        .unwrap_or_else(|| clean(&el.text().collect::<Vec<_>>().join(" ")))
}

fn extract_microdata(document: &Html, base: Option<&url::Url>, sd: &mut StructuredData) {
    let Some(scope_sel) = selector(r#"[itemscope][itemtype*="schema.org/Product"]"#) else {
        return;
    };
    let Some(scope) = document.select(&scope_sel).next() else {
        return;
    };

    let first = |prop: &str| -> Option<ElementRef<'_>> {
        let sel = selector(&format!(r#"[itemprop="{prop}"]"#))?;
        scope.select(&sel).next()
    };

    let name = first("name").map(|el| itemprop_text(&el)).filter(|s| !s.is_empty());
    let price_text = first("price").map(|el| itemprop_text(&el));
    let price = price_text.as_deref().and_then(parse_price);
    let currency = first("priceCurrency")
        .map(|el| itemprop_text(&el))
        .filter(|s| !s.is_empty())
        .or_else(|| price_text.as_deref().and_then(detect_currency));
    let condition = first("itemCondition").and_then(|el| {
        let raw = el
            .value()
            .attr("href")
            .map(str::to_string)
            .unwrap_or_else(|| itemprop_text(&el));
        parse_condition(&raw)
    });
    let images = selector(r#"[itemprop="image"]"#)
        .map(|sel| {
            scope
                .select(&sel)
                .filter_map(|el| {
                    let v = el.value();
                    v.attr("src")
                        .or_else(|| v.attr("content"))
                        .or_else(|| v.attr("href"))
                })
                .filter_map(|href| resolve(base, href))
                .collect()
        })
        .unwrap_or_default();
    let brand = first("brand").map(|el| itemprop_text(&el)).filter(|s| !s.is_empty());
    let description = first("description")
        .map(|el| itemprop_text(&el))
        .filter(|s| !s.is_empty());

    if name.is_none() && price.is_none() {
        return;
    }
    sd.has_microdata = true;
    sd.products.push(ProductData {
        name,
        description,
        brand,
        price,
        price_currency: currency,
        condition,
        images,
        seller: None,
        properties: Vec::new(),
    });
}

// ── OpenGraph extraction ────────────────────────────────────────────────────

fn extract_opengraph(document: &Html, base: Option<&url::Url>, sd: &mut StructuredData) {
    let Some(sel) = selector(r#"meta[property^="og:"], meta[property^="product:"]"#) else {
        return;
    };
    for element in document.select(&sel) {
        let property = element.value().attr("property").unwrap_or("");
        let content = clean(element.value().attr("content").unwrap_or(""));
        if content.is_empty() {
            continue;
        }
        sd.has_opengraph = true;
        match property {
            "og:type" => sd.og.og_type = Some(content),
            "og:title" => sd.og.title = Some(content),
            "og:description" => sd.og.description = Some(content),
            "og:image" | "og:image:url" | "og:image:secure_url" => {
                if let Some(img) = resolve(base, &content) {
                    if !sd.og.images.contains(&img) {
                        sd.og.images.push(img);
                    }
                }
            }
            "og:price:amount" | "product:price:amount" => {
                sd.og.price_amount.get_or_insert(content);
            }
            "og:price:currency" | "product:price:currency" => {
                sd.og.price_currency.get_or_insert(content);
            }
            "product:condition" | "og:condition" => sd.og.condition = Some(content),
            _ => {}
        }
    }
}
