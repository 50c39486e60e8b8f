//! Property tests for archive merging

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use std::collections::HashSet;

use catalog_feed_lib::application::merge_archive;
use catalog_feed_lib::domain::{CategoryFeed, Feed, RunResult};
use catalog_feed_lib::test_utils::item;

const CATEGORIES: [&str; 3] = ["Home", "Toys", "Garden"];

fn feed_strategy() -> impl Strategy<Value = Feed> {
    prop::collection::vec(prop::collection::vec(0u8..20, 0..12), 0..=CATEGORIES.len()).prop_map(|lists| Feed {
        generated_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        categories: lists
            .into_iter()
            .zip(CATEGORIES)
            .map(|(ids, name)| CategoryFeed::new(name, ids.iter().map(|id| item(&id.to_string(), name)).collect()))
            .collect(),
    })
}

fn fresh_strategy() -> impl Strategy<Value = RunResult> {
    prop::collection::vec((0usize..CATEGORIES.len(), 0u8..20), 0..24).prop_map(|entries| {
        entries
            .into_iter()
            .map(|(category, id)| item(&id.to_string(), CATEGORIES[category]))
            .collect()
    })
}

proptest! {
    #[test]
    fn empty_run_leaves_feed_unchanged(previous in feed_strategy(), cap in 0usize..10) {
        let now = Utc::now();
        let merged = merge_archive(previous.clone(), RunResult::new(), cap, now);
        prop_assert_eq!(merged.categories, previous.categories);
        prop_assert_eq!(merged.generated_at, now);
    }

    #[test]
    fn merged_categories_are_unique_and_capped(
        previous in feed_strategy(),
        fresh in fresh_strategy(),
        cap in 1usize..10,
    ) {
        let touched: HashSet<String> = fresh.categories().iter().map(|c| c.name.clone()).collect();
        let merged = merge_archive(previous.clone(), fresh.clone(), cap, Utc::now());

        for category in &merged.categories {
            if !touched.contains(&category.name) {
                continue;
            }
            prop_assert!(category.items.len() <= cap);
            let ids: HashSet<_> = category.items.iter().map(|i| i.id.as_str()).collect();
            prop_assert_eq!(ids.len(), category.items.len());

            // Fresh items lead, in run order
            let mut seen = HashSet::new();
            let expected_head: Vec<_> = fresh
                .categories()
                .iter()
                .find(|c| c.name == category.name)
                .map(|c| c.items.iter().filter(|i| seen.insert(i.id.clone())).map(|i| i.id.clone()).collect())
                .unwrap_or_default();
            let head: Vec<_> = category.items.iter().take(expected_head.len()).map(|i| i.id.clone()).collect();
            let expected: Vec<_> = expected_head.into_iter().take(cap).collect();
            prop_assert_eq!(head, expected);
        }

        for category in &previous.categories {
            prop_assert!(merged.category(&category.name).is_some());
        }
    }

    #[test]
    fn merging_the_same_run_twice_is_stable(
        previous in feed_strategy(),
        fresh in fresh_strategy(),
        cap in 0usize..10,
    ) {
        let at = Utc::now();
        let once = merge_archive(previous, fresh.clone(), cap, at);
        let twice = merge_archive(once.clone(), fresh, cap, at);
        prop_assert_eq!(once, twice);
    }
}
