//! Canonical product identity from arbitrary input URLs
//!
//! Strategies, in order:
//! 1. a well-known query parameter carrying the id directly
//! 2. a structured path pattern (`...-p-<id>.html`)
//! 3. a nested redirect-target parameter, resolved once more after decoding
//! 4. the first long digit run anywhere in the URL
//!
//! Resolution is pure; callers fall back to live navigation only when this
//! returns [`ResolutionError::NotFound`].

use anyhow::{Context, Result};
use regex::Regex;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::domain::ProductId;
use crate::infrastructure::config::IdentityConfig;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("No product identifier found in URL: {url}")]
    NotFound { url: String },
}

/// Nested redirect targets are followed this many levels deep
const MAX_REDIRECT_DEPTH: usize = 1;

pub struct IdentityResolver {
    id_query_params: Vec<String>,
    path_pattern: Regex,
    redirect_params: Vec<String>,
    digit_run: Regex,
    canonical_url_template: String,
}

impl IdentityResolver {
    pub fn new(config: &IdentityConfig) -> Result<Self> {
        let path_pattern = Regex::new(&config.path_pattern)
            .with_context(|| format!("Invalid product path pattern '{}'", config.path_pattern))?;
        let digit_run = Regex::new(&format!(r"\d{{{},}}", config.min_digit_run.max(1)))
            .context("Invalid digit run length")?;

        Ok(Self {
            id_query_params: config.id_query_params.clone(),
            path_pattern,
            redirect_params: config.redirect_params.clone(),
            digit_run,
            canonical_url_template: config.canonical_url_template.clone(),
        })
    }

    /// Derive the canonical identifier from any input URL shape
    pub fn resolve(&self, url: &str) -> Result<ProductId, ResolutionError> {
        self.resolve_at_depth(url.trim(), 0)
            .map(ProductId::new)
            .ok_or_else(|| ResolutionError::NotFound {
                url: url.to_string(),
            })
    }

    /// View URL used to visit a resolved product
    pub fn canonical_url(&self, id: &ProductId) -> String {
        self.canonical_url_template.replace("{id}", id.as_str())
    }

    /// First nested redirect target carried by `url`, decoded
    pub fn redirect_target(&self, url: &str) -> Option<String> {
        let parsed = Url::parse(url.trim()).ok()?;
        self.redirect_targets(&parsed)
            .into_iter()
            .find(|target| !target.trim().is_empty())
    }

    fn resolve_at_depth(&self, raw: &str, depth: usize) -> Option<String> {
        if let Ok(parsed) = Url::parse(raw) {
            if let Some(id) = self.from_query(&parsed) {
                debug!("Resolved {} via query parameter", id);
                return Some(id);
            }

            if let Some(id) = self.from_path(&parsed) {
                debug!("Resolved {} via path pattern", id);
                return Some(id);
            }

            if depth < MAX_REDIRECT_DEPTH {
                for target in self.redirect_targets(&parsed) {
                    if let Some(id) = self.resolve_at_depth(&target, depth + 1) {
                        debug!("Resolved {} via nested redirect target", id);
                        return Some(id);
                    }
                }
            }
        }

        self.digit_run.find(raw).map(|m| {
            debug!("Resolved {} via digit-run heuristic", m.as_str());
            m.as_str().to_string()
        })
    }

    fn from_query(&self, url: &Url) -> Option<String> {
        self.id_query_params.iter().find_map(|param| {
            url.query_pairs()
                .find(|(key, value)| key == param.as_str() && !value.trim().is_empty())
                .map(|(_, value)| value.trim().to_string())
        })
    }

    fn from_path(&self, url: &Url) -> Option<String> {
        self.path_pattern
            .captures(url.path())
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .filter(|id| !id.is_empty())
    }

    /// Decoded redirect-target values, in configured parameter order
    fn redirect_targets(&self, url: &Url) -> Vec<String> {
        self.redirect_params
            .iter()
            .filter_map(|param| {
                url.query_pairs()
                    .find(|(key, _)| key == param.as_str())
                    .map(|(_, value)| value.into_owned())
            })
            .collect()
    }
}
