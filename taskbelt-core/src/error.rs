use thiserror::Error;

/// A trigger component outside its valid range
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TriggerError {
    #[error("hour {0} is out of range 0-23")]
    Hour(u8),

    #[error("minute {0} is out of range 0-59")]
    Minute(u8),

    #[error("day of month {0} is out of range 1-31")]
    DayOfMonth(u8),

    #[error("month {0} is out of range 1-12")]
    Month(u8),
}

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Failed to connect to task scheduler on '{host}': {message}")]
    Connection { host: String, message: String },

    #[error("PowerShell exited with code {code}: {stderr}")]
    CommandFailed { code: i32, stderr: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Task '{0}' not found")]
    NotFound(String),

    #[error("Task '{0}' already exists")]
    AlreadyExists(String),

    #[error("Invalid trigger: {0}")]
    Trigger(#[from] TriggerError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{operation} rejected for task '{task}'")]
    Rejected { operation: String, task: String },
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
