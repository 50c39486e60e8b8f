//! HTML extraction infrastructure
//!
//! Pages are parsed once into an immutable [`PageContent`] and handed to an
//! ordered list of [`ExtractionStrategy`] implementations. Each strategy is a
//! pure function of the page and returns whatever fields it could fill.

pub mod config;
pub mod dom_heuristics;
pub mod error;
pub mod extraction_chain;
pub mod listing_parser;
pub mod raw_text;
pub mod structured_data;
pub mod text;

// Re-export public types
pub use config::ExtractionSelectors;
pub use error::{ExtractionError, ExtractionResult};
pub use extraction_chain::{ExtractedProduct, ExtractionChain, PartialItem};
pub use listing_parser::{ListingCard, ListingParser};

use anyhow::{Result, anyhow};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

/// Immutable view of one rendered page
pub struct PageContent<'a> {
    /// Final URL of the page, used to resolve relative references
    pub url: &'a str,
    pub document: &'a Html,
    pub raw: &'a str,
}

/// One way of reading product fields from a page
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract(&self, page: &PageContent<'_>) -> PartialItem;
}

/// Compile selector strings, skipping invalid ones
///
/// Fails only when none of a non-empty list compiles.
pub(crate) fn compile_selectors(selector_strings: &[String]) -> Result<Vec<Selector>> {
    let mut selectors = Vec::new();
    let mut errors = Vec::new();

    for selector_str in selector_strings {
        match Selector::parse(selector_str) {
            Ok(selector) => selectors.push(selector),
            Err(e) => {
                warn!("Failed to compile selector '{}': {}", selector_str, e);
                errors.push(format!("'{}': {}", selector_str, e));
            }
        }
    }

    if selectors.is_empty() && !selector_strings.is_empty() {
        return Err(anyhow!(
            "No valid selectors compiled from {} attempts. Errors: {}",
            selector_strings.len(),
            errors.join(", ")
        ));
    }

    if !errors.is_empty() {
        debug!("Some selectors failed to compile: {}", errors.join(", "));
    }

    Ok(selectors)
}

/// Compile a selector literal that is part of the source code
pub(crate) fn fixed_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| anyhow!("Invalid built-in selector '{}': {}", selector, e))
}

/// Trimmed, whitespace-collapsed text content of an element
pub(crate) fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Non-blank attribute value
pub(crate) fn attr<'a>(element: &ElementRef<'a>, name: &str) -> Option<&'a str> {
    element.value().attr(name).map(str::trim).filter(|v| !v.is_empty())
}
