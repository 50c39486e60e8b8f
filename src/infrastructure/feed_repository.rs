//! Feed file persistence
//!
//! Reading is lenient: items are decoded one by one so a single bad entry
//! does not cost the whole archive, and any unreadable file degrades to an
//! empty feed at the call site. Writing goes through a temporary file and a
//! rename so a crash never leaves a truncated feed behind.

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::domain::{CategoryFeed, Feed, Item};

#[derive(Error, Debug)]
pub enum ArchiveReadError {
    #[error("Failed to read feed file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Feed file is not valid JSON: {0}")]
    Parse(String),

    #[error("Feed file has an unexpected shape: {0}")]
    Shape(String),
}

/// Decode a previous feed document
///
/// Blank content is an empty feed. A bare array (the oldest format) or an
/// object without a `categories` array is a shape error.
pub fn parse_previous_feed(content: &str) -> Result<Feed, ArchiveReadError> {
    if content.trim().is_empty() {
        return Ok(Feed::empty(Utc::now()));
    }

    let value: Value = serde_json::from_str(content).map_err(|e| ArchiveReadError::Parse(e.to_string()))?;

    let object = match value {
        Value::Object(object) => object,
        Value::Array(_) => return Err(ArchiveReadError::Shape("bare array instead of a feed object".into())),
        other => return Err(ArchiveReadError::Shape(format!("expected an object, got {}", other))),
    };

    let categories = match object.get("categories") {
        Some(Value::Array(categories)) => categories,
        _ => return Err(ArchiveReadError::Shape("missing 'categories' array".into())),
    };

    let generated_at = object
        .get("generatedAt")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let mut feed = Feed::empty(generated_at);
    for category in categories {
        let Some(name) = category.get("name").and_then(Value::as_str) else {
            warn!("Dropping feed category without a name");
            continue;
        };

        let items = match category.get("items") {
            Some(Value::Array(items)) => items.iter().filter_map(|raw| read_item(name, raw)).collect(),
            _ => Vec::new(),
        };

        match feed.categories.iter_mut().find(|c| c.name == name) {
            Some(existing) => existing.items.extend(items),
            None => feed.categories.push(CategoryFeed::new(name, items)),
        }
    }

    Ok(feed)
}

fn read_item(category: &str, raw: &Value) -> Option<Item> {
    match serde_json::from_value::<Item>(raw.clone()) {
        Ok(mut item) if !item.id.trim().is_empty() => {
            if item.category.is_empty() {
                item.category = category.to_string();
            }
            Some(item)
        }
        Ok(_) => {
            warn!("Dropping item without an id from category '{}'", category);
            None
        }
        Err(e) => {
            warn!("Dropping unreadable item from category '{}': {}", category, e);
            None
        }
    }
}

/// Reads and writes the feed file at one path
pub struct FeedRepository {
    path: PathBuf,
}

impl FeedRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Previous feed, or `None` when no file exists yet
    pub async fn read(&self) -> Result<Option<Feed>, ArchiveReadError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ArchiveReadError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        parse_previous_feed(&content).map(Some)
    }

    /// Previous feed with every read failure degraded to an empty feed
    pub async fn load_previous(&self) -> Feed {
        match self.read().await {
            Ok(Some(feed)) => {
                info!(
                    "Loaded previous feed: {} categories, {} items",
                    feed.categories.len(),
                    feed.item_count()
                );
                feed
            }
            Ok(None) => {
                info!("No previous feed at {:?}, starting fresh", self.path);
                Feed::empty(Utc::now())
            }
            Err(e) => {
                warn!("Previous feed unusable, starting fresh: {}", e);
                Feed::empty(Utc::now())
            }
        }
    }

    /// Write the feed atomically, creating parent directories
    pub async fn save(&self, feed: &Feed) -> Result<()> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        fs::create_dir_all(&parent)
            .await
            .with_context(|| format!("Failed to create feed directory {:?}", parent))?;

        let content = serde_json::to_string_pretty(feed).context("Failed to serialize feed")?;

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "feed.json".to_string());
        let temp_path = parent.join(format!(".{}.tmp", file_name));

        fs::write(&temp_path, content)
            .await
            .with_context(|| format!("Failed to write temporary feed {:?}", temp_path))?;

        if let Err(e) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e).with_context(|| format!("Failed to replace feed {:?}", self.path));
        }

        debug!("Feed written to {:?}", self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::item;

    #[test]
    fn test_bare_array_is_a_shape_error() {
        assert!(matches!(parse_previous_feed("[]"), Err(ArchiveReadError::Shape(_))));
        assert!(matches!(
            parse_previous_feed(r#"{"generatedAt":"x"}"#),
            Err(ArchiveReadError::Shape(_))
        ));
    }

    #[test]
    fn test_non_json_is_a_parse_error() {
        assert!(matches!(parse_previous_feed("<html>"), Err(ArchiveReadError::Parse(_))));
    }

    #[test]
    fn test_blank_file_is_an_empty_feed() {
        let feed = parse_previous_feed("  \n").unwrap();
        assert!(feed.categories.is_empty());
    }

    #[test]
    fn test_bad_items_are_dropped_individually() {
        let feed = parse_previous_feed(
            r#"{
                "generatedAt": "2024-05-01T10:00:00Z",
                "categories": [
                    { "name": "Home", "items": [
                        { "id": "1", "title": "Lamp", "image": "https://img.example/1.jpg" },
                        { "title": "no id" },
                        { "id": "", "title": "blank id" },
                        { "id": 2, "title": "Rug", "primaryImage": "https://img.example/2.jpg" }
                    ]},
                    { "name": "Garden" },
                    { "items": [] }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(feed.generated_at.to_rfc3339(), "2024-05-01T10:00:00+00:00");
        assert_eq!(feed.categories.len(), 2);
        let home = feed.category("Home").unwrap();
        assert_eq!(home.items.len(), 2);
        assert_eq!(home.items[0].primary_image, "https://img.example/1.jpg");
        assert_eq!(home.items[1].id, "2");
        assert_eq!(home.items[1].category, "Home");
        assert!(feed.category("Garden").unwrap().items.is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load_previous() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FeedRepository::new(dir.path().join("nested").join("feed.json"));

        let feed = Feed {
            generated_at: Utc::now(),
            categories: vec![CategoryFeed::new("Home", vec![item("1", "Home")])],
        };
        repo.save(&feed).await.unwrap();

        let loaded = repo.load_previous().await;
        assert_eq!(loaded.item_count(), 1);
        assert_eq!(loaded.categories[0].items[0], feed.categories[0].items[0]);
        assert!(!dir.path().join("nested").join(".feed.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_missing_and_corrupt_files_load_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FeedRepository::new(dir.path().join("feed.json"));
        assert!(repo.read().await.unwrap().is_none());
        assert!(repo.load_previous().await.categories.is_empty());

        std::fs::write(repo.path(), "[1,2,3]").unwrap();
        assert!(repo.read().await.is_err());
        assert!(repo.load_previous().await.categories.is_empty());
    }
}
