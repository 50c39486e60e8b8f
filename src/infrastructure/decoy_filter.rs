//! Decoy and off-domain page detection
//!
//! App-install interstitials and store banners answer product URLs with a
//! normal-looking page. They are recognized by URL or title denylists and by
//! landing on a host outside the allowed set.

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};
use thiserror::Error;
use url::Url;

use crate::infrastructure::config::DecoyFilterConfig;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Decoy page detected at {url}: {reason}")]
pub struct DecoyDetected {
    pub url: String,
    pub reason: String,
}

impl DecoyDetected {
    fn new(url: &str, reason: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}

pub struct DecoyFilter {
    bad_urls: Vec<Regex>,
    bad_titles: Vec<Regex>,
    allowed_hosts: Vec<String>,
}

impl DecoyFilter {
    pub fn new(config: &DecoyFilterConfig) -> Result<Self> {
        Ok(Self {
            bad_urls: compile_patterns(&config.bad_url_patterns)?,
            bad_titles: compile_patterns(&config.bad_title_patterns)?,
            allowed_hosts: config
                .allowed_hosts
                .iter()
                .map(|host| host.trim().trim_start_matches('.').to_lowercase())
                .filter(|host| !host.is_empty())
                .collect(),
        })
    }

    /// Denylist check on a URL, usable before navigating
    pub fn check_url(&self, url: &str) -> Result<(), DecoyDetected> {
        match self.bad_urls.iter().find(|pattern| pattern.is_match(url)) {
            Some(pattern) => Err(DecoyDetected::new(url, format!("URL matches '{}'", pattern.as_str()))),
            None => Ok(()),
        }
    }

    pub fn check_title(&self, url: &str, title: &str) -> Result<(), DecoyDetected> {
        match self.bad_titles.iter().find(|pattern| pattern.is_match(title)) {
            Some(pattern) => Err(DecoyDetected::new(
                url,
                format!("title '{}' matches '{}'", title, pattern.as_str()),
            )),
            None => Ok(()),
        }
    }

    /// The host must equal an allowed host or be a subdomain of one
    pub fn check_host(&self, url: &str) -> Result<(), DecoyDetected> {
        if self.allowed_hosts.is_empty() {
            return Ok(());
        }

        let host = Url::parse(url)
            .ok()
            .and_then(|parsed| parsed.host_str().map(str::to_lowercase))
            .ok_or_else(|| DecoyDetected::new(url, "URL has no host"))?;

        let allowed = self
            .allowed_hosts
            .iter()
            .any(|suffix| host == *suffix || host.ends_with(&format!(".{}", suffix)));

        if allowed {
            Ok(())
        } else {
            Err(DecoyDetected::new(url, format!("host '{}' is not allowed", host)))
        }
    }

    /// Full check of a page reached by navigation
    pub fn check(&self, url: &str, title: Option<&str>) -> Result<(), DecoyDetected> {
        self.check_url(url)?;
        self.check_host(url)?;
        match title {
            Some(title) => self.check_title(url, title),
            None => Ok(()),
        }
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .with_context(|| format!("Invalid decoy pattern '{}'", pattern))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> DecoyFilter {
        DecoyFilter::new(&DecoyFilterConfig::default()).unwrap()
    }

    #[test]
    fn test_known_bad_urls_are_rejected_before_navigation() {
        let f = filter();
        assert!(f.check_url("https://www.temu.com/download-temu.html?x=1").is_err());
        assert!(f.check_url("https://play.google.com/store/apps/details?id=com.einnovation.temu").is_err());
        assert!(f.check_url("https://www.temu.com/goods.html?goods_id=1").is_ok());
    }

    #[test]
    fn test_store_banner_titles_are_rejected() {
        let f = filter();
        let err = f
            .check_title("https://www.temu.com/x", "Get it on Google  Play")
            .unwrap_err();
        assert_eq!(err.url, "https://www.temu.com/x");
        assert!(f.check_title("https://www.temu.com/x", "Cordless Drill").is_ok());
    }

    #[test]
    fn test_host_allowlist_accepts_subdomains_only() {
        let f = filter();
        assert!(f.check_host("https://www.temu.com/goods.html").is_ok());
        assert!(f.check_host("https://temu.to/k/abc").is_ok());
        assert!(f.check_host("https://nottemu.com/goods.html").is_err());
        assert!(f.check_host("https://temu.com.evil.example/").is_err());
        assert!(f.check_host("not a url").is_err());
    }

    #[test]
    fn test_empty_allowlist_allows_any_host() {
        let config = DecoyFilterConfig {
            allowed_hosts: Vec::new(),
            ..DecoyFilterConfig::default()
        };
        let f = DecoyFilter::new(&config).unwrap();
        assert!(f.check_host("https://anything.example/").is_ok());
    }

    #[test]
    fn test_check_combines_all_rules() {
        let f = filter();
        assert!(f.check("https://www.temu.com/goods.html?goods_id=1", Some("Mug")).is_ok());
        assert!(f.check("https://apps.apple.com/app/temu", None).is_err());
        assert!(
            f.check(
                "https://www.temu.com/goods.html?goods_id=1",
                Some("Shop on Temu for exclusive offers")
            )
            .is_err()
        );
    }

    #[test]
    fn test_invalid_pattern_is_a_config_error() {
        let config = DecoyFilterConfig {
            bad_url_patterns: vec!["(".to_string()],
            ..DecoyFilterConfig::default()
        };
        assert!(DecoyFilter::new(&config).is_err());
    }
}
