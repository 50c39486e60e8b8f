//! Outbound link monetization
//!
//! Two optional transforms applied in order: tracking parameters merged into
//! the product URL's query string, then wrapping in a redirect endpoint as
//! `base?u=<encoded url>`.

use std::collections::{BTreeMap, HashSet};
use tracing::debug;
use url::Url;
use url::form_urlencoded::byte_serialize;

use crate::infrastructure::config::{AffiliateConfig, AffiliateSettings};

/// Apply one effective affiliate configuration to a URL
pub fn with_affiliate(url: &str, config: &AffiliateConfig) -> String {
    let mut out = url.to_string();

    if let Some(params) = config.append_params.as_ref().filter(|p| !p.is_empty()) {
        match inject_params(&out, params) {
            Some(rewritten) => out = rewritten,
            None => debug!("Cannot add tracking parameters to unparsable URL {}", url),
        }
    }

    match config.base_redirect.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
        Some(base) => {
            let separator = if base.contains('?') { '&' } else { '?' };
            let encoded: String = byte_serialize(out.as_bytes()).collect();
            format!("{base}{separator}u={encoded}")
        }
        None => out,
    }
}

/// Set each parameter, replacing the first same-named pair in place and
/// dropping any further duplicates; new parameters are appended
fn inject_params(url: &str, params: &BTreeMap<String, String>) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;

    let existing: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut written: HashSet<&str> = HashSet::new();
    let mut pairs: Vec<(&str, &str)> = Vec::with_capacity(existing.len() + params.len());

    for (key, value) in &existing {
        match params.get_key_value(key.as_str()) {
            Some((param_key, param_value)) => {
                if written.insert(param_key.as_str()) {
                    pairs.push((param_key.as_str(), param_value.as_str()));
                }
            }
            None => pairs.push((key.as_str(), value.as_str())),
        }
    }

    for (key, value) in params {
        if written.insert(key.as_str()) {
            pairs.push((key.as_str(), value.as_str()));
        }
    }

    parsed.query_pairs_mut().clear().extend_pairs(pairs);
    Some(parsed.to_string())
}

/// Global affiliate options with per-category overrides
pub struct AffiliateRewriter {
    settings: AffiliateSettings,
}

impl AffiliateRewriter {
    pub fn new(settings: AffiliateSettings) -> Self {
        Self { settings }
    }

    /// Effective options for a category; an override option replaces the
    /// global one as a whole
    pub fn config_for(&self, category: &str) -> AffiliateConfig {
        match self.settings.categories.get(category) {
            Some(overrides) => overrides.over(&self.settings.global),
            None => self.settings.global.clone(),
        }
    }

    pub fn rewrite(&self, canonical_url: &str, category: &str) -> String {
        with_affiliate(canonical_url, &self.config_for(category))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://www.temu.com/goods.html?goods_id=601&utm_source=old&x=1";

    fn params(pairs: &[(&str, &str)]) -> Option<BTreeMap<String, String>> {
        Some(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    #[test]
    fn test_parameters_overwrite_in_place() {
        let config = AffiliateConfig {
            append_params: params(&[("utm_source", "feed"), ("ref", "abc")]),
            base_redirect: None,
        };
        assert_eq!(
            with_affiliate(URL, &config),
            "https://www.temu.com/goods.html?goods_id=601&utm_source=feed&x=1&ref=abc"
        );
    }

    #[test]
    fn test_duplicate_parameters_collapse() {
        let config = AffiliateConfig {
            append_params: params(&[("a", "2")]),
            base_redirect: None,
        };
        assert_eq!(
            with_affiliate("https://x.example/p?a=1&b=0&a=3", &config),
            "https://x.example/p?a=2&b=0"
        );
    }

    #[test]
    fn test_redirect_wrapping_separator() {
        let plain = AffiliateConfig {
            append_params: None,
            base_redirect: Some("https://go.example/r".into()),
        };
        assert_eq!(
            with_affiliate("https://www.temu.com/goods.html?goods_id=1", &plain),
            "https://go.example/r?u=https%3A%2F%2Fwww.temu.com%2Fgoods.html%3Fgoods_id%3D1"
        );

        let with_query = AffiliateConfig {
            append_params: None,
            base_redirect: Some("https://go.example/r?aff=7".into()),
        };
        assert!(with_affiliate("https://a.example/", &with_query).starts_with("https://go.example/r?aff=7&u="));
    }

    #[test]
    fn test_both_transforms_compose() {
        let config = AffiliateConfig {
            append_params: params(&[("ref", "1")]),
            base_redirect: Some("https://go.example/r".into()),
        };
        assert_eq!(
            with_affiliate("https://a.example/p", &config),
            "https://go.example/r?u=https%3A%2F%2Fa.example%2Fp%3Fref%3D1"
        );
    }

    #[test]
    fn test_no_config_or_unparsable_url_is_unchanged() {
        assert_eq!(with_affiliate(URL, &AffiliateConfig::default()), URL);

        let config = AffiliateConfig {
            append_params: params(&[("ref", "1")]),
            base_redirect: None,
        };
        assert_eq!(with_affiliate("not a url", &config), "not a url");
    }

    #[test]
    fn test_category_override_replaces_whole_option() {
        let settings = AffiliateSettings {
            global: AffiliateConfig {
                append_params: params(&[("utm_source", "feed"), ("utm_medium", "site")]),
                base_redirect: None,
            },
            categories: BTreeMap::from([(
                "Toys".to_string(),
                AffiliateConfig {
                    append_params: params(&[("ref", "toys")]),
                    base_redirect: None,
                },
            )]),
        };
        let rewriter = AffiliateRewriter::new(settings);

        assert_eq!(rewriter.rewrite("https://a.example/p", "Toys"), "https://a.example/p?ref=toys");
        assert_eq!(
            rewriter.rewrite("https://a.example/p", "Home"),
            "https://a.example/p?utm_medium=site&utm_source=feed"
        );
    }
}
