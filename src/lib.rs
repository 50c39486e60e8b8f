//! Catalog Feed - product catalog harvesting for affiliate storefronts
//!
//! Reads a list of product and category-listing URLs, visits each one through
//! a [`PageDriver`](infrastructure::PageDriver), extracts a normalized item,
//! categorizes it, rewrites its outbound link and merges the run's items into
//! a persisted JSON feed that keeps a bounded history per category.

// Module declarations
pub mod application;
pub mod domain;
pub mod infrastructure;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export the entry points used by the binary
pub use application::{CatalogPipeline, RunPaths, RunSummary};
pub use infrastructure::config::AppConfig;
