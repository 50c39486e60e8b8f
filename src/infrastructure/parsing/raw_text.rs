//! Raw-text pattern strategy
//!
//! Last resort for pages whose data only lives in inlined script state:
//! regexes over the raw markup for `"title"` and `"price"` fields and any
//! image-like URL.

use anyhow::{Context, Result};
use regex::Regex;

use super::text::{clean_title, dedupe_images, parse_price};
use super::{ExtractionStrategy, PageContent, PartialItem};

pub struct RawTextStrategy {
    title: Regex,
    price_patterns: Vec<Regex>,
    image: Regex,
}

impl RawTextStrategy {
    pub fn new() -> Result<Self> {
        let pattern_definitions = [r#""price"\s*:\s*"?([0-9][0-9.,]*)"#, r#""min_price"\s*:\s*"?([0-9][0-9.,]*)"#];

        let price_patterns = pattern_definitions
            .iter()
            .map(|pattern| Regex::new(pattern).with_context(|| format!("Invalid price pattern {}", pattern)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            title: Regex::new(r#""title"\s*:\s*"((?:[^"\\]|\\.){3,})""#).context("Invalid title pattern")?,
            price_patterns,
            image: Regex::new(r#"https?://[^"\s'<>]+?\.(?:jpe?g|png|webp)"#).context("Invalid image pattern")?,
        })
    }

    fn extract_title(&self, raw: &str) -> Option<String> {
        self.title
            .captures_iter(raw)
            .filter_map(|caps| caps.get(1))
            .find_map(|m| unescape_json_string(m.as_str()).and_then(|t| clean_title(&t)))
    }

    fn extract_price(&self, raw: &str) -> Option<f64> {
        self.price_patterns.iter().find_map(|pattern| {
            pattern
                .captures(raw)
                .and_then(|caps| caps.get(1))
                .and_then(|m| parse_price(m.as_str()))
        })
    }

    fn extract_images(&self, raw: &str) -> Vec<String> {
        // Inlined script state escapes slashes
        let unescaped = raw.replace("\\/", "/");
        dedupe_images(self.image.find_iter(&unescaped).map(|m| m.as_str().to_string()))
    }
}

impl ExtractionStrategy for RawTextStrategy {
    fn name(&self) -> &'static str {
        "raw-text"
    }

    fn extract(&self, page: &PageContent<'_>) -> PartialItem {
        let images = self.extract_images(page.raw);
        PartialItem {
            title: self.extract_title(page.raw),
            price: self.extract_price(page.raw),
            image: images.first().cloned(),
            images,
            description: None,
        }
    }
}

/// Decode JSON string escapes (`\"`, `é`, ...) of a captured value
fn unescape_json_string(escaped: &str) -> Option<String> {
    serde_json::from_str::<String>(&format!("\"{}\"", escaped)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn run(raw: &str) -> PartialItem {
        let document = Html::parse_document(raw);
        let page = PageContent {
            url: "https://www.temu.com/goods.html?goods_id=5",
            document: &document,
            raw,
        };
        RawTextStrategy::new().unwrap().extract(&page)
    }

    #[test]
    fn test_reads_inlined_state() {
        let partial = run(r#"<script>window.rawData={"goods":{"title":"Café \"Pro\" Mug","min_price":"7.49",
            "gallery":["https:\/\/img.kwcdn.com\/mug.png","https://img.kwcdn.com/mug.png","https://img.kwcdn.com/side.jpeg"]}}</script>"#);

        assert_eq!(partial.title.as_deref(), Some("Café \"Pro\" Mug"));
        assert_eq!(partial.price, Some(7.49));
        assert_eq!(
            partial.images,
            vec![
                "https://img.kwcdn.com/mug.png".to_string(),
                "https://img.kwcdn.com/side.jpeg".to_string()
            ]
        );
    }

    #[test]
    fn test_price_takes_precedence_over_min_price() {
        let partial = run(r#"{"min_price": 3, "price": "19.99"}"#);
        assert_eq!(partial.price, Some(19.99));
    }

    #[test]
    fn test_short_titles_are_ignored() {
        let partial = run(r#"{"title":"ab"}"#);
        assert!(partial.title.is_none());
    }
}
