//! Structured metadata strategy: schema.org `Product` records in JSON-LD

use anyhow::Result;
use scraper::Selector;
use serde_json::Value;
use tracing::debug;

use super::text::{absolutize, clean_title, dedupe_images, normalize_description, parse_price};
use super::{ExtractionStrategy, PageContent, PartialItem, fixed_selector};

pub struct StructuredDataStrategy {
    script_selector: Selector,
}

impl StructuredDataStrategy {
    pub fn new() -> Result<Self> {
        Ok(Self {
            script_selector: fixed_selector(r#"script[type="application/ld+json"]"#)?,
        })
    }
}

impl ExtractionStrategy for StructuredDataStrategy {
    fn name(&self) -> &'static str {
        "structured-data"
    }

    fn extract(&self, page: &PageContent<'_>) -> PartialItem {
        for script in page.document.select(&self.script_selector) {
            let body = script.text().collect::<String>();
            let value: Value = match serde_json::from_str(body.trim()) {
                Ok(value) => value,
                Err(e) => {
                    debug!("Skipping malformed JSON-LD block: {}", e);
                    continue;
                }
            };

            if let Some(product) = find_product(&value) {
                return read_product(product, page.url);
            }
        }

        PartialItem::default()
    }
}

/// Depth-first search for the first object typed `Product`
fn find_product(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(values) => values.iter().find_map(find_product),
        Value::Object(map) => {
            if is_product_type(map.get("@type")) {
                return Some(value);
            }
            map.get("@graph").and_then(find_product)
        }
        _ => None,
    }
}

fn is_product_type(value: Option<&Value>) -> bool {
    match value {
        Some(Value::String(t)) => t.eq_ignore_ascii_case("Product"),
        Some(Value::Array(types)) => types
            .iter()
            .any(|t| t.as_str().is_some_and(|t| t.eq_ignore_ascii_case("Product"))),
        _ => false,
    }
}

fn read_product(product: &Value, base: &str) -> PartialItem {
    let images = dedupe_images(
        image_urls(product.get("image"))
            .into_iter()
            .filter_map(|src| absolutize(base, &src)),
    );

    PartialItem {
        title: product.get("name").and_then(Value::as_str).and_then(clean_title),
        price: product.get("offers").and_then(offer_price),
        image: images.first().cloned(),
        images,
        description: product
            .get("description")
            .and_then(Value::as_str)
            .and_then(normalize_description),
    }
}

/// `offers` may be one offer, a list of offers or an aggregate offer
fn offer_price(offers: &Value) -> Option<f64> {
    match offers {
        Value::Array(list) => list.iter().find_map(offer_price),
        Value::Object(offer) => ["price", "lowPrice"]
            .iter()
            .find_map(|key| offer.get(*key).and_then(price_value)),
        _ => None,
    }
}

fn price_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_price(s),
        _ => None,
    }
}

/// `image` may be a URL, a list of URLs or `ImageObject`s
fn image_urls(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(url)) => vec![url.clone()],
        Some(Value::Array(list)) => list.iter().flat_map(|v| image_urls(Some(v))).collect(),
        Some(Value::Object(obj)) => obj
            .get("url")
            .or_else(|| obj.get("contentUrl"))
            .and_then(Value::as_str)
            .map(|url| vec![url.to_string()])
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}
