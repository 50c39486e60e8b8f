//! Configuration infrastructure
//!
//! One immutable `AppConfig` value is loaded at startup and shared by every
//! component. Each section falls back to the values in [`defaults`] when it is
//! missing from the file, so a config file only needs the parts it changes.
//!
//! Category-ordered data (categorizer rules) is kept as arrays: the first rule
//! reaching the best score wins a tie, so its position must be explicit.

#![allow(clippy::derivable_impls)]

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;
use tracing::info;

use crate::infrastructure::parsing::config::ExtractionSelectors;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    pub scrape: ScrapeConfig,
    pub identity: IdentityConfig,
    pub filter: DecoyFilterConfig,
    pub extraction: ExtractionSelectors,
    /// Ordered keyword rules; earlier rules win ties
    pub categorizer: Vec<CategoryRule>,
    pub affiliate: AffiliateSettings,
    pub logging: LoggingConfig,
}

/// Scheduling, pacing and capping behavior of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScrapeConfig {
    /// Tasks per batch
    pub concurrency: usize,

    pub navigation_timeout_ms: u64,
    pub settle_timeout_ms: u64,
    pub dialog_timeout_ms: u64,

    /// Upper bound for one task from page creation to release
    pub task_budget_ms: u64,

    /// Items kept per category after merging; 0 keeps everything
    pub history_cap_per_category: usize,

    /// Cards read from one listing page
    pub items_per_category_cap: usize,

    /// Fresh items a listing unit may contribute per run
    pub max_new_items_per_category: usize,

    pub enrich_details: bool,
    pub enrich_limit_per_run: usize,

    /// Randomized pause between category groups, `[min, max]` in milliseconds
    pub sleep_ms_between_groups: [u64; 2],

    /// Work units read from the input list
    pub max_items: usize,

    pub user_agent: String,
    pub accept_language: String,
}

impl ScrapeConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }

    pub fn dialog_timeout(&self) -> Duration {
        Duration::from_millis(self.dialog_timeout_ms)
    }

    pub fn task_budget(&self) -> Duration {
        Duration::from_millis(self.task_budget_ms)
    }

    /// Pause bounds with `min <= max` regardless of how they were configured
    pub fn pacing_bounds(&self) -> (u64, u64) {
        let [a, b] = self.sleep_ms_between_groups;
        (a.min(b), a.max(b))
    }
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            concurrency: defaults::CONCURRENCY,
            navigation_timeout_ms: defaults::NAVIGATION_TIMEOUT_MS,
            settle_timeout_ms: defaults::SETTLE_TIMEOUT_MS,
            dialog_timeout_ms: defaults::DIALOG_TIMEOUT_MS,
            task_budget_ms: defaults::TASK_BUDGET_MS,
            history_cap_per_category: defaults::HISTORY_CAP_PER_CATEGORY,
            items_per_category_cap: defaults::ITEMS_PER_CATEGORY_CAP,
            max_new_items_per_category: defaults::MAX_NEW_ITEMS_PER_CATEGORY,
            enrich_details: false,
            enrich_limit_per_run: defaults::ENRICH_LIMIT_PER_RUN,
            sleep_ms_between_groups: defaults::SLEEP_MS_BETWEEN_GROUPS,
            max_items: defaults::MAX_ITEMS,
            user_agent: defaults::DESKTOP_USER_AGENT.to_string(),
            accept_language: defaults::ACCEPT_LANGUAGE.to_string(),
        }
    }
}

/// Where a canonical product identifier can be found in a URL
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IdentityConfig {
    /// Query parameters carrying the identifier directly, tried in order
    pub id_query_params: Vec<String>,
    /// Regex over the URL path; capture group 1 is the identifier
    pub path_pattern: String,
    /// Query parameters holding a nested, encoded target URL
    pub redirect_params: Vec<String>,
    /// Minimum length of the last-resort digit run
    pub min_digit_run: usize,
    /// View URL for a resolved identifier; `{id}` is substituted
    pub canonical_url_template: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            id_query_params: vec!["goods_id".to_string()],
            path_pattern: defaults::PRODUCT_PATH_PATTERN.to_string(),
            redirect_params: vec!["target_url".to_string()],
            min_digit_run: defaults::MIN_DIGIT_RUN,
            canonical_url_template: defaults::CANONICAL_URL_TEMPLATE.to_string(),
        }
    }
}

/// Denylist and host allowlist for decoy pages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DecoyFilterConfig {
    /// Case-insensitive regexes matched against URLs
    pub bad_url_patterns: Vec<String>,
    /// Case-insensitive regexes matched against titles
    pub bad_title_patterns: Vec<String>,
    /// Host suffixes a product page may live on; empty allows any host
    pub allowed_hosts: Vec<String>,
}

impl Default for DecoyFilterConfig {
    fn default() -> Self {
        Self {
            bad_url_patterns: defaults::BAD_URL_PATTERNS.iter().map(|s| s.to_string()).collect(),
            bad_title_patterns: defaults::BAD_TITLE_PATTERNS.iter().map(|s| s.to_string()).collect(),
            allowed_hosts: defaults::ALLOWED_HOSTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// A category and the keywords that vote for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub name: String,
    pub keywords: Vec<String>,
}

impl CategoryRule {
    pub fn new(name: impl Into<String>, keywords: &[&str]) -> Self {
        Self {
            name: name.into(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Link monetization options; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AffiliateConfig {
    /// Tracking parameters merged into the product URL's query string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub append_params: Option<BTreeMap<String, String>>,
    /// Redirect endpoint that wraps the product URL as `u=<encoded>`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_redirect: Option<String>,
}

impl AffiliateConfig {
    /// Per-option override: an option present here replaces the global one
    /// as a whole; absent options fall back to `global`.
    pub fn over(&self, global: &AffiliateConfig) -> AffiliateConfig {
        AffiliateConfig {
            append_params: self.append_params.clone().or_else(|| global.append_params.clone()),
            base_redirect: self.base_redirect.clone().or_else(|| global.base_redirect.clone()),
        }
    }
}

/// Global affiliate options plus per-category overrides
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AffiliateSettings {
    #[serde(flatten)]
    pub global: AffiliateConfig,
    pub categories: BTreeMap<String, AffiliateConfig>,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted logs in the log file
    pub json_format: bool,

    pub console_output: bool,
    pub file_output: bool,

    /// Directory for the log file; defaults to `logs/` next to the executable
    pub log_dir: Option<PathBuf>,
    pub file_name: String,

    /// Module-specific level overrides (e.g. "reqwest": "warn")
    pub module_filters: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: false,
            log_dir: None,
            file_name: defaults::LOG_FILE_NAME.to_string(),
            module_filters: defaults::LOG_MODULE_FILTERS
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }
}

/// Loads and saves the JSON configuration file
pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    /// Load configuration; a missing file yields the defaults
    pub async fn load_config(&self) -> Result<AppConfig> {
        if !fs::try_exists(&self.config_path).await.unwrap_or(false) {
            info!("Configuration file not found, using defaults: {:?}", self.config_path);
            return Ok(AppConfig::default());
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .with_context(|| format!("Failed to read configuration file {:?}", self.config_path))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Invalid configuration file {:?}", self.config_path))?;

        info!("Loaded configuration from: {:?}", self.config_path);
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<AppConfig> {
        serde_json::from_str(content).context("Configuration file contains invalid JSON")
    }

    /// Save configuration to file
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;

        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }
}

/// Default configuration values
pub mod defaults {
    /// Tasks per batch
    pub const CONCURRENCY: usize = 6;

    pub const NAVIGATION_TIMEOUT_MS: u64 = 35_000;
    pub const SETTLE_TIMEOUT_MS: u64 = 15_000;
    pub const DIALOG_TIMEOUT_MS: u64 = 3_000;
    pub const TASK_BUDGET_MS: u64 = 120_000;

    pub const HISTORY_CAP_PER_CATEGORY: usize = 500;
    pub const ITEMS_PER_CATEGORY_CAP: usize = 60;
    pub const MAX_NEW_ITEMS_PER_CATEGORY: usize = 20;
    pub const ENRICH_LIMIT_PER_RUN: usize = 30;
    pub const SLEEP_MS_BETWEEN_GROUPS: [u64; 2] = [500, 1500];
    pub const MAX_ITEMS: usize = 200;

    /// Desktop UA keeps the site from redirecting to its app-install page
    pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
    pub const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

    pub const PRODUCT_PATH_PATTERN: &str = r"-p-(\d+)\.html$";
    pub const MIN_DIGIT_RUN: usize = 6;
    pub const CANONICAL_URL_TEMPLATE: &str = "https://www.temu.com/goods.html?goods_id={id}";

    pub const BAD_URL_PATTERNS: &[&str] = &[
        r"download-temu\.html",
        r"play\.google\.com",
        r"apps\.apple\.com",
        r"itunes\.apple\.com",
    ];
    pub const BAD_TITLE_PATTERNS: &[&str] = &[r"google\s*play", r"shop on temu for exclusive offers"];
    pub const ALLOWED_HOSTS: &[&str] = &["temu.com", "temu.to"];

    /// Category assigned when no rule scores
    pub const DEFAULT_CATEGORY: &str = "Misc";

    /// Item field limits
    pub const MAX_IMAGES: usize = 8;
    pub const MAX_DESCRIPTION_CHARS: usize = 240;

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_FILE_NAME: &str = "catalog-feed.log";
    pub const LOG_MODULE_FILTERS: &[(&str, &str)] = &[
        ("reqwest", "info"),
        ("hyper", "warn"),
        ("h2", "warn"),
        ("html5ever", "warn"),
        ("selectors", "warn"),
        ("tokio", "info"),
    ];
}
