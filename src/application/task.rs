//! Per-work-unit task contract
//!
//! A task turns one [`WorkUnit`] into zero or more items. Its progress is
//! tracked as a small state machine:
//!
//! ```text
//! Navigating -> Settling -> Extracting -> Done
//!      ^            |           |
//!      +------------+-----------+   (retry / enrichment)
//! any non-terminal state -> Failed
//! ```

#![allow(clippy::uninlined_format_args)]

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tracing::{debug, trace};

use crate::domain::{Item, WorkUnit};
use crate::infrastructure::decoy_filter::DecoyDetected;
use crate::infrastructure::identity_resolver::ResolutionError;
use crate::infrastructure::page_driver::NavigationError;
use crate::infrastructure::parsing::ExtractionError;

/// Processes one work unit in its own isolated page
#[async_trait]
pub trait TaskRunner: Send + Sync + 'static {
    async fn run(&self, unit: &WorkUnit) -> Result<Vec<Item>, TaskError>;
}

/// Why a work unit produced no items
#[derive(Error, Debug)]
pub enum TaskError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Navigation(#[from] NavigationError),

    #[error(transparent)]
    Decoy(#[from] DecoyDetected),

    #[error("Task exceeded its {budget_ms}ms budget")]
    BudgetExceeded { budget_ms: u64 },

    #[error("Task aborted: {0}")]
    Panicked(String),

    #[error("Task cancelled")]
    Cancelled,
}

impl TaskError {
    /// Stable short label written to the error report
    pub fn classification(&self) -> &'static str {
        match self {
            Self::Resolution(_) => "resolution",
            Self::Extraction(_) => "extraction",
            Self::Navigation(e) if e.is_timeout() => "navigation_timeout",
            Self::Navigation(_) => "navigation",
            Self::Decoy(_) => "decoy",
            Self::BudgetExceeded { .. } => "task_timeout",
            Self::Panicked(_) => "panic",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn detail(&self) -> String {
        self.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Navigating,
    Settling,
    Extracting,
    Done,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::{Done, Extracting, Failed, Navigating, Settling};
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Navigating, Settling)
            | (Settling, Navigating)
            | (Settling, Extracting)
            | (Extracting, Navigating)
            | (Extracting, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Navigating => "navigating",
            Self::Settling => "settling",
            Self::Extracting => "extracting",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Current state of one running task; illegal transitions are ignored and
/// logged
#[derive(Debug)]
pub struct TaskTracker {
    label: String,
    state: TaskState,
    transitions: usize,
}

impl TaskTracker {
    pub fn start(label: impl Into<String>) -> Self {
        let label = label.into();
        trace!("Task {} starts navigating", label);
        Self {
            label,
            state: TaskState::Navigating,
            transitions: 0,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn transitions(&self) -> usize {
        self.transitions
    }

    /// Move to `next`; returns whether the transition was legal
    pub fn advance(&mut self, next: TaskState) -> bool {
        if self.state == next {
            return true;
        }
        if !self.state.can_transition_to(next) {
            debug!("Task {}: ignored transition {} -> {}", self.label, self.state, next);
            return false;
        }
        debug!("Task {}: {} -> {}", self.label, self.state, next);
        self.state = next;
        self.transitions += 1;
        true
    }

    /// Record the outcome of a task body and pass it through
    pub fn finish<T>(&mut self, result: Result<T, TaskError>) -> Result<T, TaskError> {
        match &result {
            Ok(_) => {
                self.advance(TaskState::Done);
            }
            Err(e) => {
                debug!("Task {} failed while {}: {}", self.label, self.state, e);
                self.advance(TaskState::Failed);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifications() {
        let timeout = TaskError::from(NavigationError::Timeout {
            url: "https://a.example/".into(),
            timeout_ms: 10,
        });
        let http = TaskError::from(NavigationError::Http {
            url: "https://a.example/".into(),
            status: 500,
        });
        let decoy = TaskError::from(DecoyDetected {
            url: "https://play.google.com/store".into(),
            reason: "url matches a denylist pattern".into(),
        });

        assert_eq!(timeout.classification(), "navigation_timeout");
        assert_eq!(http.classification(), "navigation");
        assert_eq!(decoy.classification(), "decoy");
        assert_eq!(
            TaskError::from(ResolutionError::NotFound { url: "x".into() }).classification(),
            "resolution"
        );
        assert_eq!(TaskError::BudgetExceeded { budget_ms: 5 }.classification(), "task_timeout");
        assert_eq!(TaskError::Panicked("boom".into()).classification(), "panic");
        assert_eq!(TaskError::Cancelled.classification(), "cancelled");
    }

    #[test]
    fn test_detail_carries_source_message() {
        let err = TaskError::from(ExtractionError::insufficient("https://a.example/", vec!["title"]));
        assert_eq!(err.classification(), "extraction");
        assert!(err.detail().contains("title"));
    }

    #[test]
    fn test_happy_path_and_retry_transitions() {
        let mut tracker = TaskTracker::start("unit");
        assert!(tracker.advance(TaskState::Settling));
        assert!(tracker.advance(TaskState::Navigating));
        assert!(tracker.advance(TaskState::Settling));
        assert!(tracker.advance(TaskState::Extracting));
        assert!(tracker.advance(TaskState::Navigating));
        assert!(tracker.advance(TaskState::Settling));
        assert!(tracker.advance(TaskState::Extracting));
        assert!(tracker.finish(Ok::<_, TaskError>(())).is_ok());
        assert_eq!(tracker.state(), TaskState::Done);
        assert_eq!(tracker.transitions(), 8);
    }

    #[test]
    fn test_illegal_transitions_are_ignored() {
        let mut tracker = TaskTracker::start("unit");
        assert!(!tracker.advance(TaskState::Extracting));
        assert!(!tracker.advance(TaskState::Done));
        assert_eq!(tracker.state(), TaskState::Navigating);

        let _ = tracker.finish::<()>(Err(TaskError::Cancelled));
        assert_eq!(tracker.state(), TaskState::Failed);
        assert!(!tracker.advance(TaskState::Navigating));
        assert!(!TaskState::Done.can_transition_to(TaskState::Failed));
    }
}
