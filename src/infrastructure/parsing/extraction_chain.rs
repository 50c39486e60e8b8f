//! Ordered composition of extraction strategies
//!
//! The page is parsed once; strategies run in order until the merged record
//! has a title and an image. Earlier strategies win every field they filled.

use anyhow::Result;
use scraper::Html;
use tracing::debug;

use super::config::ExtractionSelectors;
use super::dom_heuristics::DomHeuristicStrategy;
use super::error::{ExtractionError, ExtractionResult};
use super::raw_text::RawTextStrategy;
use super::structured_data::StructuredDataStrategy;
use super::text::dedupe_images;
use super::{ExtractionStrategy, PageContent};

/// Fields a strategy managed to fill; anything may be missing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialItem {
    pub title: Option<String>,
    pub price: Option<f64>,
    pub image: Option<String>,
    pub images: Vec<String>,
    pub description: Option<String>,
}

impl PartialItem {
    /// Fill fields still missing here from a later strategy's result
    pub fn absorb(&mut self, later: PartialItem) {
        if self.title.is_none() {
            self.title = later.title;
        }
        if self.price.is_none() {
            self.price = later.price;
        }
        if self.image.is_none() {
            self.image = later.image;
        }
        if self.images.is_empty() {
            self.images = later.images;
        }
        if self.description.is_none() {
            self.description = later.description;
        }
    }

    pub fn primary_image(&self) -> Option<&str> {
        self.image.as_deref().or_else(|| self.images.first().map(String::as_str))
    }

    /// Title and at least one image are present
    pub fn is_sufficient(&self) -> bool {
        self.title.is_some() && self.primary_image().is_some()
    }
}

/// A record that passed the title/image requirement
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedProduct {
    pub title: String,
    pub price: Option<f64>,
    pub primary_image: String,
    pub images: Vec<String>,
    pub description: Option<String>,
}

pub struct ExtractionChain {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl ExtractionChain {
    /// Structured metadata, then DOM heuristics, then raw-text patterns
    pub fn new(selectors: &ExtractionSelectors) -> Result<Self> {
        Ok(Self::with_strategies(vec![
            Box::new(StructuredDataStrategy::new()?),
            Box::new(DomHeuristicStrategy::with_config(selectors)?),
            Box::new(RawTextStrategy::new()?),
        ]))
    }

    pub fn with_strategies(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Run strategies in order, stopping once the record is sufficient
    pub fn extract(&self, url: &str, html: &str) -> PartialItem {
        let document = Html::parse_document(html);
        let page = PageContent {
            url,
            document: &document,
            raw: html,
        };

        let mut merged = PartialItem::default();
        for strategy in &self.strategies {
            let partial = strategy.extract(&page);
            debug!(
                "Strategy {} on {}: title={} images={} price={:?}",
                strategy.name(),
                url,
                partial.title.is_some(),
                partial.images.len(),
                partial.price
            );
            merged.absorb(partial);

            if merged.is_sufficient() {
                debug!("Extraction sufficient after {}", strategy.name());
                break;
            }
        }
        merged
    }

    /// Extract and require a title and a primary image
    pub fn extract_product(&self, url: &str, html: &str) -> ExtractionResult<ExtractedProduct> {
        Self::finish(url, self.extract(url, html))
    }

    pub fn finish(url: &str, partial: PartialItem) -> ExtractionResult<ExtractedProduct> {
        let primary_image = partial.primary_image().map(str::to_string);

        let (title, primary_image) = match (partial.title, primary_image) {
            (Some(title), Some(image)) => (title, image),
            (title, image) => {
                let mut missing = Vec::new();
                if title.is_none() {
                    missing.push("title");
                }
                if image.is_none() {
                    missing.push("primaryImage");
                }
                return Err(ExtractionError::insufficient(url, missing));
            }
        };

        let mut images = dedupe_images(partial.images);
        if images.is_empty() {
            images.push(primary_image.clone());
        }

        Ok(ExtractedProduct {
            title,
            price: partial.price,
            primary_image,
            images,
            description: partial.description,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://www.temu.com/goods.html?goods_id=9";

    fn chain() -> ExtractionChain {
        ExtractionChain::new(&ExtractionSelectors::default()).unwrap()
    }

    struct Fixed(PartialItem, &'static str);

    impl ExtractionStrategy for Fixed {
        fn name(&self) -> &'static str {
            self.1
        }

        fn extract(&self, _page: &PageContent<'_>) -> PartialItem {
            self.0.clone()
        }
    }

    #[test]
    fn test_earlier_strategy_wins_each_field() {
        let first = PartialItem {
            title: Some("First".into()),
            price: None,
            ..PartialItem::default()
        };
        let second = PartialItem {
            title: Some("Second".into()),
            price: Some(4.0),
            images: vec!["https://img.example/a.jpg".into()],
            ..PartialItem::default()
        };
        let chain = ExtractionChain::with_strategies(vec![
            Box::new(Fixed(first, "first")),
            Box::new(Fixed(second, "second")),
        ]);

        let product = chain.extract_product(URL, "<html></html>").unwrap();
        assert_eq!(product.title, "First");
        assert_eq!(product.price, Some(4.0));
        assert_eq!(product.primary_image, "https://img.example/a.jpg");
    }

    #[test]
    fn test_stops_once_sufficient() {
        let complete = PartialItem {
            title: Some("Done".into()),
            image: Some("https://img.example/done.jpg".into()),
            ..PartialItem::default()
        };
        let later = PartialItem {
            price: Some(99.0),
            ..PartialItem::default()
        };
        let chain = ExtractionChain::with_strategies(vec![
            Box::new(Fixed(complete, "complete")),
            Box::new(Fixed(later, "later")),
        ]);

        let partial = chain.extract(URL, "");
        assert!(partial.price.is_none());
    }

    #[test]
    fn test_structured_data_completed_by_dom() {
        let html = r#"<html><head><script type="application/ld+json">
            {"@type":"Product","name":"Cable Organizer","offers":{"price":2.5}}
            </script></head><body>
            <img src="https://img.kwcdn.com/organizer.jpg">
            </body></html>"#;

        let product = chain().extract_product(URL, html).unwrap();
        assert_eq!(product.title, "Cable Organizer");
        assert_eq!(product.price, Some(2.5));
        assert_eq!(product.primary_image, "https://img.kwcdn.com/organizer.jpg");
        assert_eq!(product.images, vec!["https://img.kwcdn.com/organizer.jpg".to_string()]);
    }

    #[test]
    fn test_missing_title_is_insufficient() {
        let html = r#"<html><body><img src="https://img.kwcdn.com/x.jpg"></body></html>"#;
        let err = chain().extract_product(URL, html).unwrap_err();
        assert_eq!(err, ExtractionError::insufficient(URL, vec!["title"]));
    }

    #[test]
    fn test_missing_everything_reports_both_fields() {
        let err = chain().extract_product(URL, "<html><body></body></html>").unwrap_err();
        match err {
            ExtractionError::InsufficientData { missing, .. } => {
                assert_eq!(missing, vec!["title", "primaryImage"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
