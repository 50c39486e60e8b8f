//! Archive merging
//!
//! Fresh items go in front of what a category already held, the first
//! occurrence of each id survives and the list is cut to the history cap.
//! Categories without fresh items are carried over untouched; previously
//! persisted categories keep their position and new ones are appended in the
//! order the run produced them.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::debug;

use crate::domain::{CategoryFeed, Feed, Item, RunResult};

/// Merge one run's fresh items into the previous feed; `cap == 0` keeps
/// every item
pub fn merge_archive(previous: Feed, fresh: RunResult, cap: usize, generated_at: DateTime<Utc>) -> Feed {
    let mut categories = previous.categories;

    for fresh_category in fresh.into_categories() {
        if fresh_category.items.is_empty() {
            continue;
        }

        match categories.iter_mut().find(|c| c.name == fresh_category.name) {
            Some(existing) => {
                let persisted = std::mem::take(&mut existing.items);
                existing.items = merge_items(fresh_category.items, persisted, cap);
                debug!("Merged category {}: {} items", existing.name, existing.items.len());
            }
            None => {
                let items = merge_items(fresh_category.items, Vec::new(), cap);
                debug!("New category {}: {} items", fresh_category.name, items.len());
                categories.push(CategoryFeed::new(fresh_category.name, items));
            }
        }
    }

    Feed {
        generated_at,
        categories,
    }
}

fn merge_items(fresh: Vec<Item>, persisted: Vec<Item>, cap: usize) -> Vec<Item> {
    let limit = if cap == 0 { usize::MAX } else { cap };
    let mut seen: HashSet<String> = HashSet::new();

    fresh
        .into_iter()
        .chain(persisted)
        .filter(|item| seen.insert(item.id.clone()))
        .take(limit)
        .collect()
}
