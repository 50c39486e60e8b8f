//! CSS selector configuration for page extraction
//!
//! Every field is a fallback list: selectors are tried in order and the first
//! one producing a non-empty value wins.

use serde::{Deserialize, Serialize};

/// Selectors used by the DOM heuristic strategy and the listing parser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExtractionSelectors {
    /// Primary product heading
    pub title: Vec<String>,

    /// Elements holding a price, by attribute or class hints
    pub price: Vec<String>,

    /// Description containers, tried after the description meta tag
    pub description: Vec<String>,

    /// Product image elements; each yields `src`, then `data-src`, then a
    /// `background-image` style URL
    pub image: Vec<String>,

    /// Product cards on a category listing page
    pub listing_card: Vec<String>,

    /// Title element inside a listing card
    pub listing_title: Vec<String>,

    /// Price element inside a listing card
    pub listing_price: Vec<String>,
}

impl Default for ExtractionSelectors {
    fn default() -> Self {
        Self {
            title: strings(&[
                "h1",
                ".goods-title",
                "._title",
                "[data-title]",
                ".product-title",
            ]),
            price: strings(&[
                "[data-price]",
                "[itemprop='price']",
                ".price",
                "._price",
                "[class*='price']",
            ]),
            description: strings(&[
                "[itemprop='description']",
                "[class*='desc']",
            ]),
            image: strings(&[
                "[class*='gallery'] img",
                "[class*='swiper'] img",
                "img",
                "[style*='background-image']",
            ]),
            listing_card: strings(&[
                "div[data-goods-id]",
                "div[data-sku-id]",
                "a[href*='goods_id']",
                "a[href*='detail']",
            ]),
            listing_title: strings(&[
                "[class*='title']",
                "[title]",
                "h2",
                "h3",
            ]),
            listing_price: strings(&[
                "[data-price]",
                "[class*='price']",
            ]),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_default_selector_compiles() {
        let selectors = ExtractionSelectors::default();
        for list in [
            &selectors.title,
            &selectors.price,
            &selectors.description,
            &selectors.image,
            &selectors.listing_card,
            &selectors.listing_title,
            &selectors.listing_price,
        ] {
            for selector in list {
                assert!(scraper::Selector::parse(selector).is_ok(), "{}", selector);
            }
        }
    }

    #[test]
    fn test_partial_override_keeps_other_defaults() {
        let selectors: ExtractionSelectors =
            serde_json::from_str(r#"{ "title": [".headline"] }"#).unwrap();
        assert_eq!(selectors.title, vec![".headline".to_string()]);
        assert_eq!(selectors.listing_card.len(), 4);
    }
}
