//! Per-run failure report
//!
//! Written next to the feed when a run had failures, removed when it had
//! none, so a stale report never describes a clean run.

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// One failed work unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    pub source_url: String,
    /// Short classification such as `"navigation_timeout"` or `"decoy"`
    pub error: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub generated_at: DateTime<Utc>,
    pub failures: Vec<FailureRecord>,
}

/// Report path used when none is given: `<feed stem>.errors.json`
pub fn default_report_path(feed_path: &Path) -> PathBuf {
    let stem = feed_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "feed".to_string());
    feed_path.with_file_name(format!("{}.errors.json", stem))
}

/// Write the report, or remove a previous one when there are no failures
pub async fn write_or_clear(path: &Path, generated_at: DateTime<Utc>, failures: &[FailureRecord]) -> Result<()> {
    if failures.is_empty() {
        match fs::remove_file(path).await {
            Ok(()) => debug!("Removed stale error report {:?}", path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).with_context(|| format!("Failed to remove error report {:?}", path)),
        }
        return Ok(());
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create report directory {:?}", parent))?;
    }

    let report = ErrorReport {
        generated_at,
        failures: failures.to_vec(),
    };
    let content = serde_json::to_string_pretty(&report).context("Failed to serialize error report")?;
    fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write error report {:?}", path))?;

    info!("Wrote {} failures to {:?}", failures.len(), path);
    Ok(())
}
