//! Logging setup for the taskbelt binary
//!
//! Console output goes to stderr so stdout carries only the run summary and
//! dry-run plans. An optional daily rolling file receives JSON records.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Crates whose events are shown at the configured level
const LOG_TARGETS: [&str; 3] = ["taskbelt", "tasksync", "taskbelt_core"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingOptions {
    pub level: String,
    pub file: Option<PathBuf>,
    pub json: bool,
}

fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

/// Filter directives for `level`, used when `RUST_LOG` is not set
pub fn default_directives(level: &str) -> String {
    let level = parse_level(level).to_string().to_lowercase();
    LOG_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber. The returned guard flushes the log file
/// and must live until the process exits.
pub fn init_logging(options: &LoggingOptions) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&options.level)));

    let console_layer = if options.json {
        fmt::layer()
            .with_writer(std::io::stderr)
            .json()
            .with_current_span(true)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed()
    };

    let (file_layer, guard) = match &options.file {
        Some(log_path) => {
            let (directory, file_name) = split_log_path(log_path);
            std::fs::create_dir_all(directory).with_context(|| {
                format!("Failed to create log directory {}", directory.display())
            })?;

            let file_appender = rolling::daily(directory, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .json()
                .with_current_span(true)
                .with_span_list(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

fn split_log_path(path: &Path) -> (&Path, &std::ffi::OsStr) {
    let directory = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .unwrap_or_else(|| std::ffi::OsStr::new("taskbelt.log"));
    (directory, file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("debug", "taskbelt=debug,tasksync=debug,taskbelt_core=debug" ; "debug")]
    #[test_case("WARN", "taskbelt=warn,tasksync=warn,taskbelt_core=warn" ; "upper case")]
    #[test_case("chatty", "taskbelt=info,tasksync=info,taskbelt_core=info" ; "unknown falls back to info")]
    fn test_default_directives(level: &str, expected: &str) {
        assert_eq!(default_directives(level), expected);
    }

    #[test]
    fn test_split_log_path() {
        let (dir, name) = split_log_path(Path::new("logs/taskbelt.log"));
        assert_eq!(dir, Path::new("logs"));
        assert_eq!(name, "taskbelt.log");

        let (dir, name) = split_log_path(Path::new("run.log"));
        assert_eq!(dir, Path::new("."));
        assert_eq!(name, "run.log");
    }
}
