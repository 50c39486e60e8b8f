//! Application layer - use cases coordinating the catalog run
//!
//! Task processing, batch scheduling, categorization, link rewriting and
//! archive merging, wired together by [`CatalogPipeline`].

pub mod affiliate;
pub mod catalog_task;
pub mod categorizer;
pub mod merge;
pub mod pipeline;
pub mod scheduler;
pub mod task;

// Re-export commonly used items
pub use affiliate::{AffiliateRewriter, with_affiliate};
pub use catalog_task::CatalogTaskRunner;
pub use categorizer::{Categorizer, categorize};
pub use merge::merge_archive;
pub use pipeline::{CatalogPipeline, RunPaths, RunSummary};
pub use scheduler::{BatchReport, ScheduleOutcome, TaskRecord, TaskScheduler};
pub use task::{TaskError, TaskRunner, TaskState, TaskTracker};
