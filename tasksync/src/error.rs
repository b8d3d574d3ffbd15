//! Error types for the task sync library

use std::path::PathBuf;

use taskbelt_core::{SchedulerError, TriggerError};

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that abort a sync run. Per-line and per-task failures are reported
/// through diagnostics and metrics instead.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Path-related errors
    #[error("Path error at '{path}': {message}")]
    Path { path: PathBuf, message: String },

    /// Directory scanning errors
    #[error("Directory scan error at '{path}': {message}")]
    DirectoryScan { path: PathBuf, message: String },

    /// Task scheduler errors that prevent planning
    #[error("Task scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Create a new path error
    pub fn path_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Path {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new directory scan error
    pub fn scan_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::DirectoryScan {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Why a single directive line was skipped
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectiveError {
    #[error("unknown directive keyword '{0}'")]
    UnknownKeyword(String),

    #[error("directive '{0}' has no schedule values")]
    MissingValue(String),

    #[error("invalid time '{value}': {reason}")]
    InvalidTime { value: String, reason: String },

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("{0}")]
    OutOfRange(#[from] TriggerError),

    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },
}

impl DirectiveError {
    pub fn invalid_time(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTime {
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_cron(expression: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidCron {
            expression: expression.into(),
            reason: reason.into(),
        }
    }
}
