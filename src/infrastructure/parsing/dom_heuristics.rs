//! Heuristic DOM strategy
//!
//! Reads the primary heading, price-labeled elements, the description meta
//! tag and image sources from the rendered document.

#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use scraper::{ElementRef, Selector};
use tracing::debug;

use super::config::ExtractionSelectors;
use super::text::{
    absolutize, background_image_url, clean_title, dedupe_images, normalize_description, parse_price,
};
use super::{ExtractionStrategy, PageContent, PartialItem, attr, compile_selectors, element_text, fixed_selector};

pub struct DomHeuristicStrategy {
    title_selectors: Vec<Selector>,
    price_selectors: Vec<Selector>,
    description_selectors: Vec<Selector>,
    image_selectors: Vec<Selector>,
    og_title: Selector,
    og_image: Selector,
    meta_description: Selector,
}

impl DomHeuristicStrategy {
    pub fn new() -> Result<Self> {
        Self::with_config(&ExtractionSelectors::default())
    }

    pub fn with_config(selectors: &ExtractionSelectors) -> Result<Self> {
        Ok(Self {
            title_selectors: compile_selectors(&selectors.title)?,
            price_selectors: compile_selectors(&selectors.price)?,
            description_selectors: compile_selectors(&selectors.description)?,
            image_selectors: compile_selectors(&selectors.image)?,
            og_title: fixed_selector(r#"meta[property="og:title"]"#)?,
            og_image: fixed_selector(r#"meta[property="og:image"]"#)?,
            meta_description: fixed_selector(
                r#"meta[name="description"], meta[property="og:description"]"#,
            )?,
        })
    }

    fn extract_title(&self, page: &PageContent<'_>) -> Option<String> {
        for (i, selector) in self.title_selectors.iter().enumerate() {
            for element in page.document.select(selector) {
                let text = attr(&element, "data-title")
                    .map(str::to_string)
                    .unwrap_or_else(|| element_text(&element));
                if let Some(title) = clean_title(&text) {
                    debug!("Extracted title using selector {}: {}", i, title);
                    return Some(title);
                }
            }
        }

        page.document
            .select(&self.og_title)
            .find_map(|meta| attr(&meta, "content").and_then(clean_title))
    }

    fn extract_price(&self, page: &PageContent<'_>) -> Option<f64> {
        self.price_selectors.iter().find_map(|selector| {
            page.document.select(selector).find_map(|element| {
                ["data-price", "content"]
                    .iter()
                    .find_map(|name| attr(&element, name).and_then(parse_price))
                    .or_else(|| parse_price(&element_text(&element)))
            })
        })
    }

    fn extract_description(&self, page: &PageContent<'_>) -> Option<String> {
        page.document
            .select(&self.meta_description)
            .find_map(|meta| attr(&meta, "content").and_then(normalize_description))
            .or_else(|| {
                self.description_selectors.iter().find_map(|selector| {
                    page.document
                        .select(selector)
                        .find_map(|element| normalize_description(&element_text(&element)))
                })
            })
    }

    fn extract_images(&self, page: &PageContent<'_>) -> Vec<String> {
        let og = page
            .document
            .select(&self.og_image)
            .filter_map(|meta| attr(&meta, "content").and_then(|src| absolutize(page.url, src)));

        let elements = self.image_selectors.iter().flat_map(|selector| {
            page.document
                .select(selector)
                .filter_map(|element| image_source(&element, page.url))
        });

        dedupe_images(og.chain(elements))
    }
}

impl ExtractionStrategy for DomHeuristicStrategy {
    fn name(&self) -> &'static str {
        "dom-heuristics"
    }

    fn extract(&self, page: &PageContent<'_>) -> PartialItem {
        let images = self.extract_images(page);
        PartialItem {
            title: self.extract_title(page),
            price: self.extract_price(page),
            image: images.first().cloned(),
            images,
            description: self.extract_description(page),
        }
    }
}

/// Image URL of an element: `src`, then the lazy-load `data-src`, then an
/// inline `background-image`
pub(crate) fn image_source(element: &ElementRef<'_>, base: &str) -> Option<String> {
    ["src", "data-src"]
        .iter()
        .find_map(|name| attr(element, name).and_then(|src| absolutize(base, src)))
        .or_else(|| {
            attr(element, "style")
                .and_then(background_image_url)
                .and_then(|src| absolutize(base, src))
        })
}
