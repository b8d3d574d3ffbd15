//! Core task scheduler library
//!
//! This crate provides the pieces shared by the sync engine and the CLI:
//! the normalized trigger model, the task scheduler collaborator trait and
//! its backends, and task definition rendering.

pub mod error;
pub mod scheduler;
pub mod trigger;

pub use error::{Result, SchedulerError, TriggerError};
pub use scheduler::{
    normalize_folder, ConnectionInfo, MemoryScheduler, PowerShellScheduler, RunAs, ScheduledTask,
    TaskRegistration, TaskScheduler, TaskState,
};
pub use trigger::{DaySet, MonthSet, TimeOfDay, TriggerDescriptor, WeekdaySet};

/// Marker token that identifies directive comments in batch files
pub const DEFAULT_MARKER: &str = "taskbelt";
