//! End-to-end catalog run
//!
//! load work list → group by category → schedule batches (paced between
//! groups) → acceptance gate → merge into the previous feed → persist feed
//! and error report.

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{RunResult, WorkUnit};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::error_report::{FailureRecord, default_report_path, write_or_clear};
use crate::infrastructure::feed_repository::FeedRepository;
use crate::infrastructure::page_driver::PageDriver;
use crate::infrastructure::work_list::load_work_units;

use super::catalog_task::CatalogTaskRunner;
use super::merge::merge_archive;
use super::scheduler::{ScheduleOutcome, TaskScheduler};

/// Files a run reads and writes
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub links: PathBuf,
    pub feed: PathBuf,
    /// Defaults to `<feed stem>.errors.json` next to the feed
    pub errors: Option<PathBuf>,
}

impl RunPaths {
    pub fn new(links: impl Into<PathBuf>, feed: impl Into<PathBuf>) -> Self {
        Self {
            links: links.into(),
            feed: feed.into(),
            errors: None,
        }
    }

    pub fn error_report(&self) -> PathBuf {
        self.errors
            .clone()
            .unwrap_or_else(|| default_report_path(&self.feed))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Work units loaded
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Accepted fresh items per category, in first-seen order
    pub items_by_category: Vec<(String, usize)>,
    pub failures: Vec<FailureRecord>,
    /// Set when the run was cancelled; nothing was written
    pub interrupted: bool,
    /// Items in the feed after merging
    pub feed_items: usize,
}

impl RunSummary {
    fn from_outcome(total: usize, outcome: &ScheduleOutcome) -> Self {
        let failures = outcome
            .records
            .iter()
            .filter_map(|record| {
                record.outcome.as_ref().err().map(|e| FailureRecord {
                    source_url: record.unit.source_url.clone(),
                    error: e.classification().to_string(),
                    detail: e.detail(),
                })
            })
            .collect();

        Self {
            total,
            succeeded: outcome.succeeded(),
            failed: outcome.failed(),
            failures,
            interrupted: outcome.cancelled,
            ..Default::default()
        }
    }

    pub fn fresh_items(&self) -> usize {
        self.items_by_category.iter().map(|(_, count)| count).sum()
    }

    fn log(&self) {
        info!(
            "✅ Run finished: {} units, {} succeeded, {} failed, {} fresh items, {} items in feed",
            self.total,
            self.succeeded,
            self.failed,
            self.fresh_items(),
            self.feed_items
        );
        for (category, count) in &self.items_by_category {
            info!("   {}: {} fresh items", category, count);
        }
    }
}

pub struct CatalogPipeline {
    config: AppConfig,
    driver: Arc<dyn PageDriver>,
}

impl CatalogPipeline {
    pub fn new(config: AppConfig, driver: Arc<dyn PageDriver>) -> Self {
        Self { config, driver }
    }

    /// Run once; only an empty work list or an unwritable feed is an error
    pub async fn run(&self, paths: &RunPaths, cancel: &CancellationToken) -> Result<RunSummary> {
        let run_started = Utc::now();
        info!("🚀 Starting catalog run: {:?} -> {:?}", paths.links, paths.feed);

        let units = load_work_units(&paths.links, self.config.scrape.max_items).await?;
        let total = units.len();

        let runner = Arc::new(
            CatalogTaskRunner::new(&self.config, Arc::clone(&self.driver), run_started)
                .context("Failed to prepare task runner")?,
        );
        let scheduler = TaskScheduler::from_config(&self.config.scrape);

        let mut outcome = ScheduleOutcome::default();
        for (index, (key, group)) in group_units(units).into_iter().enumerate() {
            if index > 0 && !self.pause(cancel).await {
                outcome.cancelled = true;
                break;
            }

            info!(
                "📂 Group {}: {} units",
                key.as_deref().unwrap_or("(uncategorized)"),
                group.len()
            );
            outcome.absorb(scheduler.run(Arc::clone(&runner), group, cancel).await);
            if outcome.cancelled {
                break;
            }
        }

        let mut summary = RunSummary::from_outcome(total, &outcome);
        if summary.interrupted {
            warn!(
                "⚠️ Run interrupted after {} of {} units; {:?} left untouched",
                outcome.records.len(),
                total,
                paths.feed
            );
            return Ok(summary);
        }

        let fresh = accept(outcome);
        summary.items_by_category = fresh
            .categories()
            .iter()
            .map(|category| (category.name.clone(), category.items.len()))
            .collect();

        let repository = FeedRepository::new(&paths.feed);
        let previous = repository.load_previous().await;
        let merged = merge_archive(
            previous,
            fresh,
            self.config.scrape.history_cap_per_category,
            run_started,
        );
        repository
            .save(&merged)
            .await
            .with_context(|| format!("Cannot write feed {:?}", paths.feed))?;
        summary.feed_items = merged.item_count();

        let report_path = paths.error_report();
        if let Err(e) = write_or_clear(&report_path, run_started, &summary.failures).await {
            warn!("Error report not updated: {:#}", e);
        }

        summary.log();
        Ok(summary)
    }

    /// Randomized pause between groups; false when cancelled while waiting
    async fn pause(&self, cancel: &CancellationToken) -> bool {
        let (min, max) = self.config.scrape.pacing_bounds();
        if max == 0 {
            return !cancel.is_cancelled();
        }

        let delay = Duration::from_millis(fastrand::u64(min..=max));
        debug!("Pausing {:?} before the next group", delay);
        tokio::select! {
            () = cancel.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }
}

/// Units grouped by category in first-appearance order; uncategorized units
/// share one group
fn group_units(units: Vec<WorkUnit>) -> Vec<(Option<String>, Vec<WorkUnit>)> {
    let mut groups: Vec<(Option<String>, Vec<WorkUnit>)> = Vec::new();
    for unit in units {
        let key = unit.group_key().map(str::to_string);
        match groups.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, group)) => group.push(unit),
            None => groups.push((key, vec![unit])),
        }
    }
    groups
}

/// Acceptance gate: only items with a title and a primary image reach the
/// merge
fn accept(outcome: ScheduleOutcome) -> RunResult {
    outcome
        .records
        .into_iter()
        .filter_map(|record| record.outcome.ok())
        .flatten()
        .filter(|item| {
            let ok = item.is_acceptable();
            if !ok {
                warn!("Dropping item {} without title or primary image", item.id);
            }
            ok
        })
        .collect()
}
