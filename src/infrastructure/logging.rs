//! Logging system configuration and initialization
//!
//! - Console and/or file output (file output through a non-blocking writer)
//! - Configuration based log level, `RUST_LOG` overrides it
//! - Structured JSON file logging (optional)
//! - Local-time timestamps

#![allow(clippy::uninlined_format_args)]

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::Local;
use tracing::info;
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;

/// Dependencies that drown application logs unless TRACE is requested
const NOISY_TARGETS: &[(&str, &str)] = &[
    ("sqlx::query", "warn"),
    ("sqlx::sqlite", "warn"),
    ("sqlx::migrate", "info"),
    ("reqwest", "warn"),
    ("hyper", "warn"),
    ("hyper_util", "warn"),
    ("h2", "warn"),
    ("tower_http", "warn"),
    ("html5ever", "warn"),
    ("selectors", "warn"),
];

/// Timestamps in the host's local timezone
struct LocalTimeFormatter;

impl FormatTime for LocalTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f %:z"))
    }
}

/// Builds the level filter. `RUST_LOG` wins over the configured level.
pub fn build_env_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut filter = EnvFilter::try_new(level)
        .map_err(|e| anyhow!("Invalid log level '{}': {}", level, e))?;

    if !level.to_lowercase().contains("trace") {
        for (target, target_level) in NOISY_TARGETS {
            let directive = format!("{}={}", target, target_level)
                .parse()
                .with_context(|| format!("Invalid log directive for {}", target))?;
            filter = filter.add_directive(directive);
        }
    }

    Ok(filter)
}

/// Initializes the global subscriber.
///
/// The returned guard flushes the file writer on drop; `main` holds it for
/// the lifetime of the process.
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = build_env_filter(&config.level)?;

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    let mut guard = None;

    if config.file_output {
        let (writer, file_guard) = open_log_writer(&config.log_dir, &config.file_name)?;
        guard = Some(file_guard);

        let file_layer = if config.json_format {
            fmt::Layer::new()
                .json()
                .with_writer(writer)
                .with_timer(LocalTimeFormatter)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false)
                .boxed()
        } else {
            fmt::Layer::new()
                .with_writer(writer)
                .with_timer(LocalTimeFormatter)
                .with_target(true)
                .with_ansi(false)
                .boxed()
        };
        layers.push(file_layer);
    }

    if config.console_output {
        layers.push(
            fmt::Layer::new()
                .with_writer(std::io::stdout)
                .with_timer(LocalTimeFormatter)
                .with_target(false)
                .boxed(),
        );
    }

    Registry::default()
        .with(layers)
        .with(env_filter)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))?;

    if config.file_output {
        info!(
            "Logging initialized: level={}, file={}",
            config.level,
            config.log_dir.join(&config.file_name).display()
        );
    } else {
        info!("Logging initialized: level={}, console only", config.level);
    }

    Ok(guard)
}

fn open_log_writer(log_dir: &Path, file_name: &str) -> Result<(non_blocking::NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
    let appender = rolling::never(log_dir, file_name);
    Ok(non_blocking(appender))
}
