use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Canonical product identifier, independent of any tracking or redirect wrapping
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ProductId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<ProductId> for String {
    fn from(id: ProductId) -> Self {
        id.0
    }
}

/// One catalog entry as persisted in the feed
///
/// Older feed files used different field names (`image`, `productUrl`,
/// `product_id`, `main_image`, `link_out`) and sometimes stored prices as
/// strings; those shapes are still accepted on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    #[serde(alias = "product_id", deserialize_with = "lenient::id")]
    pub id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default, deserialize_with = "lenient::price")]
    pub price: Option<f64>,

    #[serde(default, alias = "image", alias = "main_image")]
    pub primary_image: String,

    #[serde(default)]
    pub images: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub category: String,

    /// Monetized URL shown to end users
    #[serde(default, alias = "productUrl", alias = "link_out")]
    pub outbound_url: String,

    /// Canonical view URL used when the product is visited again
    #[serde(default, alias = "url")]
    pub source_url: String,

    #[serde(
        default,
        alias = "last_seen",
        deserialize_with = "lenient::timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_seen: Option<DateTime<Utc>>,
}

impl Item {
    /// Items without a title or a primary image never reach the archive
    pub fn is_acceptable(&self) -> bool {
        !self.title.trim().is_empty() && !self.primary_image.trim().is_empty()
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] ({})", self.title, self.id, self.category)
    }
}

mod lenient {
    use super::{DateTime, Deserialize, Deserializer, Utc};
    use serde_json::Value;

    pub fn id<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(serde::de::Error::custom(format!(
                "item id must be a string or number, got {other}"
            ))),
        }
    }

    pub fn price<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => crate::infrastructure::parsing::text::parse_price(&s),
            _ => None,
        })
    }

    pub fn timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_acceptance_requires_title_and_image() {
        let mut item: Item = serde_json::from_value(json!({
            "id": "1", "title": "Lamp", "primaryImage": "https://img.example/1.jpg"
        }))
        .unwrap();
        assert!(item.is_acceptable());

        item.title = "   ".to_string();
        assert!(!item.is_acceptable());
    }

    #[test]
    fn test_legacy_item_shape_is_accepted() {
        let item: Item = serde_json::from_value(json!({
            "product_id": 601099512345678u64,
            "title": "Desk Fan",
            "price": "1,299.50",
            "main_image": "https://img.example/fan.jpg",
            "link_out": "https://temu.to/k/abc",
            "url": "https://www.temu.com/goods.html?goods_id=601099512345678",
            "last_seen": "not a date"
        }))
        .unwrap();

        assert_eq!(item.id, "601099512345678");
        assert_eq!(item.price, Some(1299.5));
        assert_eq!(item.primary_image, "https://img.example/fan.jpg");
        assert_eq!(item.outbound_url, "https://temu.to/k/abc");
        assert!(item.last_seen.is_none());
    }

    #[test]
    fn test_item_serializes_camel_case() {
        let item = Item {
            id: "7".into(),
            title: "Mug".into(),
            price: None,
            primary_image: "https://img.example/mug.png".into(),
            images: vec![],
            description: None,
            category: "Kitchen".into(),
            outbound_url: "https://out.example/?u=x".into(),
            source_url: "https://www.temu.com/goods.html?goods_id=7".into(),
            last_seen: None,
        };
        let value = serde_json::to_value(&item).unwrap();
        assert!(value.get("primaryImage").is_some());
        assert!(value.get("outboundUrl").is_some());
        assert!(value.get("description").is_none());
        assert!(value["price"].is_null());
    }
}
