//! Page driver capability
//!
//! The pipeline never depends on a specific automation engine. It needs a
//! page it can navigate, ask for its current URL, query for text, snapshot
//! for extraction and close. [`PageGuard`] owns one such page for the length
//! of a task and closes it on every exit path.

#![allow(clippy::uninlined_format_args)]

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

/// When a navigation counts as finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitCondition {
    #[default]
    DomContentLoaded,
    NetworkIdle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationOptions {
    pub wait_condition: WaitCondition,
    pub timeout: Duration,
}

impl NavigationOptions {
    pub fn new(wait_condition: WaitCondition, timeout: Duration) -> Self {
        Self {
            wait_condition,
            timeout,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NavigationError {
    #[error("Navigation to {url} timed out after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("Network failure for {url}: {message}")]
    Network { url: String, message: String },

    #[error("HTTP error {status} for {url}")]
    Http { url: String, status: u16 },

    #[error("Invalid URL: {url}")]
    InvalidUrl { url: String },

    #[error("Page already closed")]
    Closed,
}

impl NavigationError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Rendered content of a page at one point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSnapshot {
    /// URL the page reports after redirects
    pub url: String,
    pub html: String,
}

/// One isolated page or tab
#[async_trait]
pub trait PageHandle: Send + Sync {
    async fn navigate(&mut self, url: &str, options: &NavigationOptions) -> Result<(), NavigationError>;

    /// URL after navigation and redirects; `None` before the first navigation
    fn current_url(&self) -> Option<String>;

    /// Wait for late network activity to calm down
    async fn wait_for_settle(&mut self, timeout: Duration) -> Result<(), NavigationError>;

    /// Close consent or app-install overlays; returns how many were closed
    async fn dismiss_dialogs(&mut self, timeout: Duration) -> Result<usize, NavigationError>;

    async fn query_selector_text(&self, selector: &str) -> Option<String>;

    async fn snapshot(&self) -> Result<PageSnapshot, NavigationError>;

    async fn close(&mut self) -> Result<(), NavigationError>;
}

/// Factory for isolated pages
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn PageHandle>, NavigationError>;
}

/// Scoped ownership of a page
///
/// `close` is the normal path. On early returns, panics or cancellation the
/// guard is dropped and the close is spawned on the runtime it was opened on.
pub struct PageGuard {
    page: Option<Box<dyn PageHandle>>,
    label: String,
    runtime_handle: Handle,
}

impl PageGuard {
    pub async fn open(driver: &dyn PageDriver, label: impl Into<String>) -> Result<Self, NavigationError> {
        let label = label.into();
        let page = driver.new_page().await?;
        trace!("Opened page for {}", label);
        Ok(Self {
            page: Some(page),
            label,
            runtime_handle: Handle::current(),
        })
    }

    fn page(&self) -> Result<&dyn PageHandle, NavigationError> {
        self.page.as_deref().ok_or(NavigationError::Closed)
    }

    fn page_mut(&mut self) -> Result<&mut Box<dyn PageHandle>, NavigationError> {
        self.page.as_mut().ok_or(NavigationError::Closed)
    }

    /// Navigate within `options.timeout`, whatever the driver does
    pub async fn navigate(&mut self, url: &str, options: &NavigationOptions) -> Result<(), NavigationError> {
        debug!("Navigating to {} ({:?})", url, options.wait_condition);
        let page = self.page_mut()?;
        match timeout(options.timeout, page.navigate(url, options)).await {
            Ok(result) => result,
            Err(_) => Err(NavigationError::Timeout {
                url: url.to_string(),
                timeout_ms: options.timeout.as_millis() as u64,
            }),
        }
    }

    /// Best-effort settle wait; a timeout or failure is only logged
    pub async fn settle(&mut self, limit: Duration) {
        let label = self.label.clone();
        let Ok(page) = self.page_mut() else { return };
        match timeout(limit, page.wait_for_settle(limit)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Settle wait failed for {}: {}", label, e),
            Err(_) => debug!("Settle wait timed out after {:?} for {}", limit, label),
        }
    }

    /// Best-effort dialog dismissal; returns how many dialogs were closed
    pub async fn dismiss_dialogs(&mut self, limit: Duration) -> usize {
        let label = self.label.clone();
        let Ok(page) = self.page_mut() else { return 0 };
        match timeout(limit, page.dismiss_dialogs(limit)).await {
            Ok(Ok(closed)) => closed,
            Ok(Err(e)) => {
                debug!("Dialog dismissal failed for {}: {}", label, e);
                0
            }
            Err(_) => {
                debug!("Dialog dismissal timed out after {:?} for {}", limit, label);
                0
            }
        }
    }

    pub fn current_url(&self) -> Option<String> {
        self.page().ok().and_then(|page| page.current_url())
    }

    pub async fn query_selector_text(&self, selector: &str) -> Option<String> {
        match self.page() {
            Ok(page) => page.query_selector_text(selector).await,
            Err(_) => None,
        }
    }

    pub async fn snapshot(&self) -> Result<PageSnapshot, NavigationError> {
        self.page()?.snapshot().await
    }

    /// Run an extraction function against the rendered content
    pub async fn evaluate<T, F>(&self, f: F) -> Result<T, NavigationError>
    where
        F: FnOnce(&PageSnapshot) -> T,
    {
        let snapshot = self.snapshot().await?;
        Ok(f(&snapshot))
    }

    /// Close the page, consuming the guard
    pub async fn close(mut self) {
        if let Some(mut page) = self.page.take() {
            if let Err(e) = page.close().await {
                warn!("Failed to close page for {}: {}", self.label, e);
            } else {
                trace!("Closed page for {}", self.label);
            }
        }
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        if let Some(mut page) = self.page.take() {
            let label = std::mem::take(&mut self.label);
            self.runtime_handle.spawn(async move {
                if let Err(e) = page.close().await {
                    warn!("Page cleanup on drop failed for {}: {}", label, e);
                } else {
                    trace!("Page cleanup on drop succeeded for {}", label);
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::StaticPageDriver;

    fn options() -> NavigationOptions {
        NavigationOptions::new(WaitCondition::DomContentLoaded, Duration::from_millis(500))
    }

    #[tokio::test]
    async fn test_explicit_close_releases_page() {
        let driver = StaticPageDriver::new().with_page("https://a.example/", "<h1>A</h1>");
        let mut guard = PageGuard::open(&driver, "test").await.unwrap();
        guard.navigate("https://a.example/", &options()).await.unwrap();
        assert_eq!(guard.current_url().as_deref(), Some("https://a.example/"));

        guard.close().await;
        assert_eq!(driver.open_pages(), 0);
        assert_eq!(driver.opened_pages(), 1);
    }

    #[tokio::test]
    async fn test_drop_releases_page() {
        let driver = StaticPageDriver::new();
        {
            let _guard = PageGuard::open(&driver, "dropped").await.unwrap();
            assert_eq!(driver.open_pages(), 1);
        }
        // Cleanup runs on a spawned task
        for _ in 0..50 {
            if driver.open_pages() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(driver.open_pages(), 0);
    }

    #[tokio::test]
    async fn test_navigation_timeout_is_enforced() {
        let driver = StaticPageDriver::new()
            .with_page("https://slow.example/", "<h1>slow</h1>")
            .with_delay("https://slow.example/", Duration::from_secs(5));
        let mut guard = PageGuard::open(&driver, "slow").await.unwrap();

        let options = NavigationOptions::new(WaitCondition::NetworkIdle, Duration::from_millis(20));
        let err = guard.navigate("https://slow.example/", &options).await.unwrap_err();
        assert!(err.is_timeout());
        guard.close().await;
    }

    #[tokio::test]
    async fn test_evaluate_runs_against_snapshot() {
        let driver = StaticPageDriver::new().with_page("https://a.example/", "<h1>Title</h1>");
        let mut guard = PageGuard::open(&driver, "eval").await.unwrap();
        guard.navigate("https://a.example/", &options()).await.unwrap();

        let len = guard.evaluate(|snapshot| snapshot.html.len()).await.unwrap();
        assert_eq!(len, "<h1>Title</h1>".len());
        assert_eq!(guard.query_selector_text("h1").await.as_deref(), Some("Title"));
        guard.close().await;
    }
}
