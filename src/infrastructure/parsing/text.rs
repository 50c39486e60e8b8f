//! Free-text normalization shared by the extraction strategies

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

pub use crate::infrastructure::config::defaults::{MAX_DESCRIPTION_CHARS, MAX_IMAGES};

static PRICE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("valid price pattern"));

/// Parse the first numeric token of a free-form price string
///
/// Thousands separators and whitespace are removed first, so `"$1, 299.50"`
/// reads as `1299.5`. Returns `None` when no digit is present.
pub fn parse_price(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();

    PRICE_TOKEN
        .find(&cleaned)
        .and_then(|token| token.as_str().parse().ok())
}

/// Collapse whitespace runs, trim and cap the length in characters
pub fn normalize_description(text: &str) -> Option<String> {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }
    Some(collapsed.chars().take(MAX_DESCRIPTION_CHARS).collect())
}

/// Collapse whitespace in a title; blank titles are absent
pub fn clean_title(text: &str) -> Option<String> {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

/// Resolve a possibly relative or protocol-relative reference against `base`
pub fn absolutize(base: &str, reference: &str) -> Option<String> {
    let reference = reference.trim();
    if reference.is_empty() || reference.starts_with("data:") {
        return None;
    }

    if let Ok(url) = Url::parse(reference) {
        return matches!(url.scheme(), "http" | "https").then(|| url.to_string());
    }

    Url::parse(base)
        .and_then(|base| base.join(reference))
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .map(|url| url.to_string())
}

/// Drop duplicates preserving first occurrence, then cap the list
pub fn dedupe_images<I>(images: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut out: Vec<String> = Vec::new();
    for image in images {
        if out.len() >= MAX_IMAGES {
            break;
        }
        if !image.is_empty() && !out.contains(&image) {
            out.push(image);
        }
    }
    out
}

/// Extract the URL from a CSS `background-image: url(...)` declaration
pub fn background_image_url(style: &str) -> Option<&str> {
    let start = style.find("url(")? + "url(".len();
    let end = start + style[start..].find(')')?;
    let inner = style[start..end].trim().trim_matches(|c| c == '"' || c == '\'');
    (!inner.is_empty()).then_some(inner)
}
