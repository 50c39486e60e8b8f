//! Persisted feed and per-run accumulation types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::product::Item;

/// One named category with its ordered items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryFeed {
    pub name: String,
    pub items: Vec<Item>,
}

impl CategoryFeed {
    pub fn new(name: impl Into<String>, items: Vec<Item>) -> Self {
        Self {
            name: name.into(),
            items,
        }
    }
}

/// The persisted artifact, one version per run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feed {
    pub generated_at: DateTime<Utc>,
    pub categories: Vec<CategoryFeed>,
}

impl Feed {
    /// Feed with no categories, used for first runs and unreadable archives
    pub fn empty(generated_at: DateTime<Utc>) -> Self {
        Self {
            generated_at,
            categories: Vec::new(),
        }
    }

    pub fn category(&self, name: &str) -> Option<&CategoryFeed> {
        self.categories.iter().find(|c| c.name == name)
    }

    pub fn item_count(&self) -> usize {
        self.categories.iter().map(|c| c.items.len()).sum()
    }
}

/// Fresh items of the current run, grouped by category in first-seen order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunResult {
    categories: Vec<CategoryFeed>,
}

impl RunResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: Item) {
        match self.categories.iter_mut().find(|c| c.name == item.category) {
            Some(category) => category.items.push(item),
            None => self
                .categories
                .push(CategoryFeed::new(item.category.clone(), vec![item])),
        }
    }

    pub fn item_count(&self) -> usize {
        self.categories.iter().map(|c| c.items.len()).sum()
    }

    pub fn categories(&self) -> &[CategoryFeed] {
        &self.categories
    }

    pub fn into_categories(self) -> Vec<CategoryFeed> {
        self.categories
    }
}

impl FromIterator<Item> for RunResult {
    fn from_iter<I: IntoIterator<Item = Item>>(iter: I) -> Self {
        let mut result = Self::new();
        for item in iter {
            result.push(item);
        }
        result
    }
}
