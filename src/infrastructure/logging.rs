//! Logging system configuration and initialization
//!
//! - Console output and/or a non-blocking log file
//! - Optional JSON formatting for the file layer
//! - Level and per-module filters from the configuration, overridable
//!   with `RUST_LOG`
//! - Local-time timestamps

#![allow(clippy::uninlined_format_args)]

use anyhow::{Result, anyhow};
use chrono::Local;
use once_cell::sync::Lazy;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::info;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;

// Keeps the file writer alive for the lifetime of the process
static LOG_GUARDS: Lazy<Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>>> =
    Lazy::new(|| Mutex::new(Vec::new()));

/// Local wall-clock time with milliseconds and offset
struct LocalTimeFormatter;

impl FormatTime for LocalTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f %:z"))
    }
}

/// Get the default log directory: `logs/` next to the executable
pub fn get_log_directory() -> PathBuf {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    exe_dir.join("logs")
}

/// Build the level filter for a configuration
///
/// Dependency targets listed in `module_filters` are capped unless the
/// requested level is `trace`. `RUST_LOG`, when set, replaces all of it.
pub fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut filter = EnvFilter::try_new(&config.level)
        .map_err(|e| anyhow!("Invalid log level '{}': {}", config.level, e))?;

    if !config.level.to_lowercase().contains("trace") {
        for (module, level) in &config.module_filters {
            let directive = format!("{}={}", module, level)
                .parse()
                .map_err(|e| anyhow!("Invalid log filter '{}={}': {}", module, level, e))?;
            filter = filter.add_directive(directive);
        }
    }

    let own = format!("catalog_feed_lib={}", config.level)
        .parse()
        .map_err(|e| anyhow!("Invalid log level '{}': {}", config.level, e))?;
    Ok(filter.add_directive(own))
}

/// Initialize logging with custom configuration
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    if !config.console_output && !config.file_output {
        return Err(anyhow!("No logging output configured"));
    }

    let env_filter = build_env_filter(config)?;

    let console_layer = config.console_output.then(|| {
        fmt::Layer::new()
            .with_writer(std::io::stderr)
            .with_timer(LocalTimeFormatter)
            .with_target(false)
            .boxed()
    });

    let mut log_path = None;
    let file_layer = if config.file_output {
        let log_dir = config.log_dir.clone().unwrap_or_else(get_log_directory);
        std::fs::create_dir_all(&log_dir)
            .map_err(|e| anyhow!("Failed to create log directory {:?}: {}", log_dir, e))?;

        let (file_writer, file_guard) = non_blocking(rolling::never(&log_dir, &config.file_name));
        LOG_GUARDS
            .lock()
            .map_err(|_| anyhow!("Log guard registry poisoned"))?
            .push(file_guard);
        log_path = Some(log_dir.join(&config.file_name));

        let layer = if config.json_format {
            fmt::Layer::new()
                .json()
                .with_writer(file_writer)
                .with_timer(LocalTimeFormatter)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false)
                .boxed()
        } else {
            fmt::Layer::new()
                .with_writer(file_writer)
                .with_timer(LocalTimeFormatter)
                .with_target(false)
                .with_ansi(false)
                .boxed()
        };
        Some(layer)
    } else {
        None
    };

    Registry::default()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("Logging already initialized: {}", e))?;

    info!("Logging system initialized (level: {})", config.level);
    if let Some(path) = log_path {
        info!("Log file: {:?} (json: {})", path, config.json_format);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_config_default() {
        let config = LoggingConfig::default();
        assert!(!config.level.is_empty());
        assert!(config.console_output);
        assert!(config.module_filters.contains_key("reqwest"));
    }

    #[test]
    fn test_log_directory_is_named_logs() {
        assert!(get_log_directory().to_string_lossy().ends_with("logs"));
    }

    #[test]
    fn test_no_output_is_rejected() {
        let config = LoggingConfig {
            console_output: false,
            file_output: false,
            ..LoggingConfig::default()
        };
        assert!(init_logging_with_config(&config).is_err());
    }
}
