//! Sync engine that reconciles batch files with a task scheduler folder

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};

use taskbelt_core::{
    normalize_folder, RunAs, ScheduledTask, SchedulerError, TaskRegistration, TaskScheduler,
};

use crate::diff::{DiffEngine, HashComparison, ReconciliationPlan, TaskUpdate};
use crate::error::Result;
use crate::metrics::{SyncMetrics, TaskOperation};
use crate::scanner::{BatchFile, Collision, DirectoryScanner, ScanOptions};

/// Options for sync runs
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Scheduler folder owned by the sync, e.g. `\Batch\`
    pub folder: String,
    /// Principal new tasks run as
    pub run_as: RunAs,
    /// Plan only, never touch the scheduler
    pub dry_run: bool,
    pub scan_options: ScanOptions,
}

impl SyncOptions {
    pub fn new(folder: &str, run_as: RunAs) -> Self {
        Self {
            folder: normalize_folder(folder),
            run_as,
            dry_run: false,
            scan_options: ScanOptions::default(),
        }
    }
}

/// Result of a sync run
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub plan: ReconciliationPlan,
    pub collisions: Vec<Collision>,
    pub metrics: SyncMetrics,
}

/// Reconciles batch files against one scheduler folder
pub struct SyncEngine {
    scheduler: Arc<dyn TaskScheduler>,
    options: SyncOptions,
    scanner: DirectoryScanner,
    diff_engine: DiffEngine,
}

impl SyncEngine {
    pub fn new(scheduler: Arc<dyn TaskScheduler>, options: SyncOptions) -> Self {
        let scanner = DirectoryScanner::new(options.scan_options.clone());
        Self {
            scheduler,
            options,
            scanner,
            diff_engine: DiffEngine::new(),
        }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Collect batch files from `dirs`, plan against the folder and apply the
    /// plan. Only a missing directory or a failed folder listing aborts the
    /// run; individual task failures are counted in the metrics.
    pub async fn sync<P: AsRef<Path>>(&self, dirs: &[P]) -> Result<SyncReport> {
        let mut metrics = SyncMetrics::new();
        metrics.start();
        metrics.dry_run = self.options.dry_run;

        let scan_start = Instant::now();
        let collection = self.scanner.collect(dirs).await?;
        metrics.errors.total_warnings += collection.diagnostics + collection.collisions.len();

        let plan = self.plan(collection.files).await?;
        metrics.record_scan(
            plan.to_create.len() + plan.to_update.len(),
            plan.to_update.len() + plan.to_delete.len(),
            scan_start.elapsed(),
        );

        let summary = plan.summary();
        info!(
            folder = %self.options.folder,
            creates = summary.creates,
            recreates = summary.recreates,
            unchanged = summary.unchanged,
            deletes = summary.deletes,
            collisions = collection.collisions.len(),
            "Generated reconciliation plan"
        );

        if self.options.dry_run {
            log_dry_run(&plan);
        } else {
            self.apply(&plan, &mut metrics).await;
        }

        metrics.complete();

        Ok(SyncReport {
            plan,
            collisions: collection.collisions,
            metrics,
        })
    }

    /// Plan `files` against the tasks currently in the folder
    pub async fn plan(&self, files: Vec<BatchFile>) -> Result<ReconciliationPlan> {
        let existing = self.scheduler.list_tasks(&self.options.folder).await?;
        Ok(self.diff_engine.generate_plan(files, existing))
    }

    /// Apply a plan: deletes, then creates, then updates. One at a time, and
    /// a failure never stops the remaining operations.
    pub async fn apply(&self, plan: &ReconciliationPlan, metrics: &mut SyncMetrics) {
        for task in &plan.to_delete {
            info!(task = %task.path(), "Deleting task without batch file");
            match self.remove_task(task, metrics).await {
                Ok(()) => metrics.record_operation(TaskOperation::Delete, &task.name),
                Err(e) => {
                    error!(
                        task = %task.name,
                        folder = %task.folder,
                        error = %e,
                        "Failed to delete task"
                    );
                    metrics.record_failure(TaskOperation::Delete, &task.name, e.to_string());
                }
            }
        }

        for file in &plan.to_create {
            info!(task = %file.task_name, path = %file.path.display(), "Creating task");
            match self.create_task(file).await {
                Ok(_) => metrics.record_operation(TaskOperation::Create, &file.task_name),
                Err(e) => {
                    log_create_failure(file, &e);
                    metrics.record_failure(TaskOperation::Create, &file.task_name, e.to_string());
                }
            }
        }

        for update in &plan.to_update {
            self.apply_update(update, metrics).await;
        }
    }

    async fn apply_update(&self, update: &TaskUpdate, metrics: &mut SyncMetrics) {
        let TaskUpdate {
            existing,
            file,
            comparison,
        } = update;

        match comparison {
            HashComparison::Same => {
                info!(task = %existing.path(), "Task is up to date");
                metrics.record_operation(TaskOperation::Verify, &existing.name);
                return;
            }
            HashComparison::BothMissing => warn!(
                task = %existing.path(),
                path = %file.path.display(),
                "Neither the task nor the batch file has a content hash, recreating"
            ),
            _ => info!(
                task = %existing.path(),
                comparison = ?comparison,
                "Task definition changed, recreating"
            ),
        }

        // The create is still attempted when the delete fails
        if let Err(e) = self.remove_task(existing, metrics).await {
            error!(
                task = %existing.name,
                folder = %existing.folder,
                error = %e,
                "Failed to delete task before recreating it"
            );
            metrics.record_failure(TaskOperation::Delete, &existing.name, e.to_string());
        }

        match self.create_task(file).await {
            Ok(_) => metrics.record_operation(TaskOperation::Recreate, &file.task_name),
            Err(e) => {
                log_create_failure(file, &e);
                metrics.record_failure(TaskOperation::Recreate, &file.task_name, e.to_string());
            }
        }
    }

    /// Stop and disable a task (both best effort), then delete it
    pub async fn remove_task(
        &self,
        task: &ScheduledTask,
        metrics: &mut SyncMetrics,
    ) -> std::result::Result<(), SchedulerError> {
        if task.state.is_active() {
            if let Err(e) = self.scheduler.stop(task).await {
                metrics.record_best_effort_failure(TaskOperation::Stop, &task.name, &e.to_string());
            }
        }

        if let Err(e) = self.scheduler.set_enabled(task, false).await {
            metrics.record_best_effort_failure(TaskOperation::Disable, &task.name, &e.to_string());
        }

        self.scheduler.delete(task).await
    }

    /// Register a task for a batch file
    pub async fn create_task(
        &self,
        file: &BatchFile,
    ) -> std::result::Result<ScheduledTask, SchedulerError> {
        let registration = self.registration_for(file);
        self.scheduler.register(&registration).await
    }

    pub fn registration_for(&self, file: &BatchFile) -> TaskRegistration {
        TaskRegistration {
            folder: self.options.folder.clone(),
            name: file.task_name.clone(),
            executable: file.path.clone(),
            working_directory: file.directory().to_path_buf(),
            triggers: file.triggers.clone(),
            description: format!("Synchronized from {}", file.path.display()),
            documentation: file.content_hash.clone(),
            run_as: self.options.run_as.clone(),
        }
    }
}

fn log_create_failure(file: &BatchFile, e: &SchedulerError) {
    error!(
        task = %file.task_name,
        path = %file.path.display(),
        triggers = %file.describe_triggers(),
        error = %e,
        "Failed to register task"
    );
}

fn log_dry_run(plan: &ReconciliationPlan) {
    for task in &plan.to_delete {
        info!(task = %task.path(), "DRY RUN: would delete task");
    }
    for file in &plan.to_create {
        info!(
            task = %file.task_name,
            triggers = %file.describe_triggers(),
            "DRY RUN: would create task"
        );
    }
    for update in plan.to_update.iter().filter(|u| u.comparison.requires_recreate()) {
        info!(
            task = %update.existing.path(),
            triggers = %update.file.describe_triggers(),
            "DRY RUN: would recreate task"
        );
    }
}
