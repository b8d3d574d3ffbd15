//! Task Sync Library
//!
//! Keeps a Windows Task Scheduler folder in line with scheduling directives
//! written as comments inside batch files:
//! - Directive parsing and cron expansion
//! - Batch file collection with collision detection
//! - Reconciliation planning against the registered tasks
//! - Sequential plan application with per-task error isolation
//! - Dry-run capabilities and run metrics

pub mod cron;
pub mod diff;
pub mod directive;
pub mod error;
pub mod metrics;
pub mod scanner;
pub mod sync_engine;

// Re-export main types and functions
pub use diff::{DiffEngine, HashComparison, PlanSummary, ReconciliationPlan, TaskUpdate};
pub use directive::{Diagnostic, DirectiveParser, ParsedDirectives, ParserOptions};
pub use error::{DirectiveError, Result, SyncError};
pub use metrics::{SyncMetrics, TaskOperation, TaskStats};
pub use scanner::{BatchFile, CollectionReport, Collision, DirectoryScanner, ScanOptions};
pub use sync_engine::{SyncEngine, SyncOptions, SyncReport};

use std::path::Path;
use std::sync::Arc;

use taskbelt_core::TaskScheduler;

/// Synchronize the batch files in `dirs` into the scheduler folder named in
/// `options`
pub async fn synchronize<P: AsRef<Path>>(
    scheduler: Arc<dyn TaskScheduler>,
    dirs: &[P],
    options: SyncOptions,
) -> Result<SyncReport> {
    let engine = SyncEngine::new(scheduler, options);
    engine.sync(dirs).await
}

/// Collect the directive-bearing batch files in `dirs`
pub async fn collect_batch_files<P: AsRef<Path>>(
    dirs: &[P],
    options: ScanOptions,
) -> Result<Vec<BatchFile>> {
    let scanner = DirectoryScanner::new(options);
    Ok(scanner.collect(dirs).await?.files)
}

// Test modules
#[cfg(test)]
mod diff_tests;
