//! Metrics and statistics for sync runs

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Operations applied to the task scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOperation {
    /// New task registered for a batch file
    Create,
    /// Task matched a batch file with unchanged directives
    Verify,
    /// Task deleted and registered again with new triggers
    Recreate,
    /// Task with no remaining batch file removed
    Delete,
    /// Best-effort stop of a running task before deletion
    Stop,
    /// Best-effort disable before deletion
    Disable,
}

impl fmt::Display for TaskOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskOperation::Create => "create",
            TaskOperation::Verify => "verify",
            TaskOperation::Recreate => "recreate",
            TaskOperation::Delete => "delete",
            TaskOperation::Stop => "stop",
            TaskOperation::Disable => "disable",
        };
        f.write_str(name)
    }
}

/// A scheduler operation that did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationFailure {
    pub operation: TaskOperation,
    pub task: String,
    pub message: String,
}

/// Counts of the operations applied in a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStats {
    /// Batch files with at least one valid directive
    pub discovered: usize,
    /// Tasks found in the scheduler folder
    pub existing: usize,
    pub created: usize,
    pub verified: usize,
    pub recreated: usize,
    pub deleted: usize,
    /// Operations that failed (best-effort stop/disable excluded)
    pub failed: usize,
}

/// Error and warning statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorStats {
    pub total_errors: usize,
    /// Malformed directives, name collisions and best-effort failures
    pub total_warnings: usize,
    pub errors_by_operation: HashMap<String, usize>,
    pub failures: Vec<OperationFailure>,
}

/// Metrics for one sync run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncMetrics {
    /// Unique session identifier
    pub session_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration: Duration,
    /// Time spent collecting batch files
    pub scan_time: Duration,
    pub tasks: TaskStats,
    pub errors: ErrorStats,
    /// Whether mutations were skipped
    pub dry_run: bool,
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            start_time: Utc::now(),
            end_time: None,
            duration: Duration::default(),
            scan_time: Duration::default(),
            tasks: TaskStats::default(),
            errors: ErrorStats::default(),
            dry_run: false,
        }
    }

    /// Mark the run as started
    pub fn start(&mut self) {
        self.start_time = Utc::now();
    }

    /// Mark the run as completed and log the totals
    pub fn complete(&mut self) {
        let end = Utc::now();
        self.end_time = Some(end);
        self.duration = (end - self.start_time).to_std().unwrap_or_default();

        info!(
            session_id = %self.session_id,
            duration_secs = self.duration.as_secs_f64(),
            created = self.tasks.created,
            verified = self.tasks.verified,
            recreated = self.tasks.recreated,
            deleted = self.tasks.deleted,
            failed = self.tasks.failed,
            warnings = self.errors.total_warnings,
            dry_run = self.dry_run,
            "Sync run completed"
        );
    }

    /// Record scan results
    pub fn record_scan(&mut self, discovered: usize, existing: usize, duration: Duration) {
        self.tasks.discovered += discovered;
        self.tasks.existing += existing;
        self.scan_time += duration;
    }

    /// Record a successful operation
    pub fn record_operation(&mut self, operation: TaskOperation, task: &str) {
        debug!(operation = %operation, task = %task, "Task operation recorded");

        match operation {
            TaskOperation::Create => self.tasks.created += 1,
            TaskOperation::Verify => self.tasks.verified += 1,
            TaskOperation::Recreate => self.tasks.recreated += 1,
            TaskOperation::Delete => self.tasks.deleted += 1,
            TaskOperation::Stop | TaskOperation::Disable => {}
        }
    }

    /// Record a failed operation. The caller logs the failure with its
    /// context; the run continues.
    pub fn record_failure(
        &mut self,
        operation: TaskOperation,
        task: impl Into<String>,
        message: impl Into<String>,
    ) {
        let task = task.into();
        let message = message.into();

        debug!(
            operation = %operation,
            task = %task,
            message = %message,
            "Task operation failure recorded"
        );

        self.tasks.failed += 1;
        self.errors.total_errors += 1;
        *self
            .errors
            .errors_by_operation
            .entry(operation.to_string())
            .or_insert(0) += 1;
        self.errors.failures.push(OperationFailure {
            operation,
            task,
            message,
        });
    }

    /// Record a best-effort step that failed without failing the operation
    pub fn record_best_effort_failure(
        &mut self,
        operation: TaskOperation,
        task: &str,
        message: &str,
    ) {
        warn!(
            operation = %operation,
            task = %task,
            message = %message,
            "Best-effort task operation failed"
        );
        self.record_warning();
    }

    /// Record a warning
    pub fn record_warning(&mut self) {
        self.errors.total_warnings += 1;
    }

    /// True when no scheduler operation failed
    pub fn is_successful(&self) -> bool {
        self.tasks.failed == 0
    }

    /// One-line summary of the run
    pub fn summary(&self) -> String {
        format!(
            "created={} verified={} recreated={} deleted={} failed={}",
            self.tasks.created,
            self.tasks.verified,
            self.tasks.recreated,
            self.tasks.deleted,
            self.tasks.failed
        )
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_metrics() {
        let metrics = SyncMetrics::new();
        assert_eq!(metrics.tasks, TaskStats::default());
        assert_eq!(metrics.errors.total_errors, 0);
        assert!(metrics.is_successful());
    }

    #[test]
    fn test_record_operations() {
        let mut metrics = SyncMetrics::new();

        metrics.record_operation(TaskOperation::Create, "backup");
        metrics.record_operation(TaskOperation::Create, "cleanup");
        metrics.record_operation(TaskOperation::Verify, "report");
        metrics.record_operation(TaskOperation::Recreate, "rotate");
        metrics.record_operation(TaskOperation::Delete, "legacy");
        metrics.record_operation(TaskOperation::Stop, "legacy");

        assert_eq!(metrics.tasks.created, 2);
        assert_eq!(metrics.tasks.verified, 1);
        assert_eq!(metrics.tasks.recreated, 1);
        assert_eq!(metrics.tasks.deleted, 1);
        assert_eq!(
            metrics.summary(),
            "created=2 verified=1 recreated=1 deleted=1 failed=0"
        );
    }

    #[test]
    fn test_record_failure() {
        let mut metrics = SyncMetrics::new();

        metrics.record_failure(TaskOperation::Delete, "legacy", "access denied");
        metrics.record_failure(TaskOperation::Create, "backup", "already exists");
        metrics.record_best_effort_failure(TaskOperation::Stop, "legacy", "not running");

        assert!(!metrics.is_successful());
        assert_eq!(metrics.tasks.failed, 2);
        assert_eq!(metrics.errors.total_errors, 2);
        assert_eq!(metrics.errors.total_warnings, 1);
        assert_eq!(metrics.errors.errors_by_operation.get("delete"), Some(&1));
        assert_eq!(metrics.errors.failures[1].task, "backup");
    }

    #[test]
    fn test_complete_sets_end_time() {
        let mut metrics = SyncMetrics::new();
        metrics.complete();
        assert!(metrics.end_time.is_some());
        assert!(metrics.end_time.unwrap() >= metrics.start_time);
    }

    #[test]
    fn test_json_serialization() {
        let mut metrics = SyncMetrics::new();
        metrics.record_failure(TaskOperation::Recreate, "rotate", "boom");
        let json = metrics.to_json().unwrap();
        let deserialized: SyncMetrics = serde_json::from_str(&json).unwrap();

        assert_eq!(metrics.session_id, deserialized.session_id);
        assert_eq!(metrics.tasks, deserialized.tasks);
        assert_eq!(deserialized.errors.failures[0].operation, TaskOperation::Recreate);
    }
}
