//! Bounded-width batch scheduling
//!
//! Work units run in sequential batches of `concurrency` tasks. Every task in
//! a batch is spawned at once and the batch is joined before the next one
//! starts. Each task writes only its own result slot; nothing is aggregated
//! until the batch has drained.

#![allow(clippy::uninlined_format_args)]

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::domain::{Item, WorkUnit};
use crate::infrastructure::config::ScrapeConfig;

use super::task::{TaskError, TaskRunner};

/// Outcome of one work unit
#[derive(Debug)]
pub struct TaskRecord {
    pub unit: WorkUnit,
    pub outcome: Result<Vec<Item>, TaskError>,
}

impl TaskRecord {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub index: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Records of every fully drained batch, in input order
#[derive(Debug, Default)]
pub struct ScheduleOutcome {
    pub records: Vec<TaskRecord>,
    pub batches: Vec<BatchReport>,
    /// Set when cancellation stopped the schedule; the interrupted batch is
    /// not part of `records`
    pub cancelled: bool,
}

impl ScheduleOutcome {
    pub fn succeeded(&self) -> usize {
        self.records.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.records.len() - self.succeeded()
    }

    /// Fold another schedule's results into this one
    pub fn absorb(&mut self, other: ScheduleOutcome) {
        let offset = self.batches.len();
        self.records.extend(other.records);
        self.batches.extend(other.batches.into_iter().map(|mut batch| {
            batch.index += offset;
            batch
        }));
        self.cancelled |= other.cancelled;
    }
}

pub struct TaskScheduler {
    concurrency: usize,
    task_budget: Duration,
}

impl TaskScheduler {
    /// A zero budget disables the per-task time limit
    pub fn new(concurrency: usize, task_budget: Duration) -> Self {
        Self {
            concurrency: concurrency.max(1),
            task_budget,
        }
    }

    pub fn from_config(config: &ScrapeConfig) -> Self {
        Self::new(config.concurrency, config.task_budget())
    }

    pub async fn run<R: TaskRunner>(
        &self,
        runner: Arc<R>,
        units: Vec<WorkUnit>,
        cancel: &CancellationToken,
    ) -> ScheduleOutcome {
        let mut outcome = ScheduleOutcome::default();
        let batch_count = units.len().div_ceil(self.concurrency);

        for (index, batch) in units.chunks(self.concurrency).enumerate() {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }

            info!(
                "🚀 Batch {}/{}: starting {} tasks",
                index + 1,
                batch_count,
                batch.len()
            );

            let handles: Vec<_> = batch
                .iter()
                .cloned()
                .map(|unit| {
                    let runner = Arc::clone(&runner);
                    let cancel = cancel.clone();
                    let budget = self.task_budget;
                    tokio::spawn(async move { run_one(runner.as_ref(), &unit, budget, &cancel).await })
                })
                .collect();

            let joined = join_all(handles).await;

            if cancel.is_cancelled() {
                warn!("Batch {} interrupted, discarding its results", index + 1);
                outcome.cancelled = true;
                break;
            }

            let mut report = BatchReport {
                index,
                succeeded: 0,
                failed: 0,
            };
            for (unit, result) in batch.iter().zip(joined) {
                let result = match result {
                    Ok(result) => result,
                    Err(join_error) => {
                        error!("❌ Task for {} aborted: {}", unit.source_url, join_error);
                        Err(TaskError::Panicked(join_error.to_string()))
                    }
                };

                match &result {
                    Ok(_) => report.succeeded += 1,
                    Err(e) => {
                        warn!("Work unit {} failed ({}): {}", unit.source_url, e.classification(), e);
                        report.failed += 1;
                    }
                }
                outcome.records.push(TaskRecord {
                    unit: unit.clone(),
                    outcome: result,
                });
            }

            info!(
                "📊 Batch {}/{} completed: {} succeeded, {} failed",
                index + 1,
                batch_count,
                report.succeeded,
                report.failed
            );
            outcome.batches.push(report);
        }

        outcome
    }
}

async fn run_one<R: TaskRunner>(
    runner: &R,
    unit: &WorkUnit,
    budget: Duration,
    cancel: &CancellationToken,
) -> Result<Vec<Item>, TaskError> {
    let work = async {
        if budget.is_zero() {
            return runner.run(unit).await;
        }
        match timeout(budget, runner.run(unit)).await {
            Ok(result) => result,
            Err(_) => Err(TaskError::BudgetExceeded {
                budget_ms: budget.as_millis() as u64,
            }),
        }
    };

    tokio::select! {
        () = cancel.cancelled() => Err(TaskError::Cancelled),
        result = work => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::parsing::ExtractionError;
    use crate::test_utils::item;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Behavior is picked by the unit's URL
    #[derive(Default)]
    struct ScriptedRunner {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl TaskRunner for ScriptedRunner {
        async fn run(&self, unit: &WorkUnit) -> Result<Vec<Item>, TaskError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;

            let result: Result<Vec<Item>, TaskError> = match unit.source_url.as_str() {
                url if url.starts_with("fail") => {
                    Err(ExtractionError::insufficient(url, vec!["title"]).into())
                }
                url if url.starts_with("panic") => panic!("scripted panic for {url}"),
                url if url.starts_with("slow") => {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok(Vec::new())
                }
                url => Ok(vec![item(url, "Misc")]),
            };
            self.running.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    fn units(urls: &[&str]) -> Vec<WorkUnit> {
        urls.iter().map(|url| WorkUnit::product(*url, None)).collect()
    }

    #[tokio::test]
    async fn test_batches_report_in_input_order() {
        let scheduler = TaskScheduler::new(2, Duration::from_secs(5));
        let runner = Arc::new(ScriptedRunner::default());

        let outcome = scheduler
            .run(Arc::clone(&runner), units(&["a", "b", "fail-c", "d", "e"]), &CancellationToken::new())
            .await;

        let urls: Vec<_> = outcome.records.iter().map(|r| r.unit.source_url.as_str()).collect();
        assert_eq!(urls, vec!["a", "b", "fail-c", "d", "e"]);
        assert_eq!(
            outcome.batches,
            vec![
                BatchReport { index: 0, succeeded: 2, failed: 0 },
                BatchReport { index: 1, succeeded: 1, failed: 1 },
                BatchReport { index: 2, succeeded: 1, failed: 0 },
            ]
        );
        assert_eq!(outcome.succeeded(), 4);
        assert_eq!(outcome.failed(), 1);
        assert!(!outcome.cancelled);
        assert!(runner.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let scheduler = TaskScheduler::new(3, Duration::from_secs(5));
        let outcome = scheduler
            .run(
                Arc::new(ScriptedRunner::default()),
                units(&["a", "panic-b", "c"]),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(outcome.succeeded(), 2);
        let failure = outcome.records[1].outcome.as_ref().unwrap_err();
        assert_eq!(failure.classification(), "panic");
    }

    #[tokio::test]
    async fn test_task_budget_is_enforced() {
        let scheduler = TaskScheduler::new(2, Duration::from_millis(50));
        let outcome = scheduler
            .run(Arc::new(ScriptedRunner::default()), units(&["slow-a", "b"]), &CancellationToken::new())
            .await;

        let failure = outcome.records[0].outcome.as_ref().unwrap_err();
        assert_eq!(failure.classification(), "task_timeout");
        assert!(outcome.records[1].is_success());
    }

    #[tokio::test]
    async fn test_cancellation_discards_running_batch() {
        let scheduler = TaskScheduler::new(2, Duration::from_secs(30));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let outcome = scheduler
            .run(
                Arc::new(ScriptedRunner::default()),
                units(&["a", "b", "slow-c", "slow-d", "e"]),
                &cancel,
            )
            .await;

        assert!(outcome.cancelled);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.batches.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let runner = Arc::new(ScriptedRunner::default());

        let outcome = TaskScheduler::new(4, Duration::ZERO)
            .run(Arc::clone(&runner), units(&["a"]), &cancel)
            .await;

        assert!(outcome.cancelled);
        assert!(outcome.records.is_empty());
        assert_eq!(runner.peak.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_absorb_renumbers_batches() {
        let mut first = ScheduleOutcome {
            batches: vec![BatchReport { index: 0, succeeded: 1, failed: 0 }],
            ..Default::default()
        };
        let second = ScheduleOutcome {
            batches: vec![BatchReport { index: 0, succeeded: 0, failed: 2 }],
            cancelled: true,
            ..Default::default()
        };
        first.absorb(second);
        assert_eq!(first.batches[1].index, 1);
        assert!(first.cancelled);
    }
}
