//! Reconciliation planning: batch files against the tasks already registered

use std::collections::HashMap;

use serde::Serialize;
use taskbelt_core::ScheduledTask;

use crate::scanner::BatchFile;

/// How the hash stored on a task relates to the hash of its batch file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HashComparison {
    /// Both present and equal
    Same,
    /// Both present and different
    Changed,
    /// The task carries no hash
    StoredMissing,
    /// The batch file has no hash
    CurrentMissing,
    /// Neither side has a hash
    BothMissing,
}

impl HashComparison {
    pub fn of(stored: Option<&str>, current: Option<&str>) -> Self {
        match (stored, current) {
            (Some(stored), Some(current)) if stored == current => Self::Same,
            (Some(_), Some(_)) => Self::Changed,
            (None, Some(_)) => Self::StoredMissing,
            (Some(_), None) => Self::CurrentMissing,
            (None, None) => Self::BothMissing,
        }
    }

    /// Anything but an exact match means the task is rebuilt
    pub fn requires_recreate(&self) -> bool {
        !matches!(self, Self::Same)
    }
}

/// A batch file with a task already registered under its name
#[derive(Debug, Clone, Serialize)]
pub struct TaskUpdate {
    pub existing: ScheduledTask,
    pub file: BatchFile,
    pub comparison: HashComparison,
}

impl TaskUpdate {
    pub fn new(existing: ScheduledTask, file: BatchFile) -> Self {
        let comparison = HashComparison::of(
            existing.documentation.as_deref(),
            file.content_hash.as_deref(),
        );
        Self {
            existing,
            file,
            comparison,
        }
    }
}

/// Operations needed to bring a scheduler folder in line with the batch files
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconciliationPlan {
    pub to_create: Vec<BatchFile>,
    /// Every matched task, including the ones whose hash is unchanged
    pub to_update: Vec<TaskUpdate>,
    pub to_delete: Vec<ScheduledTask>,
}

/// Summary of a plan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub creates: usize,
    pub recreates: usize,
    pub unchanged: usize,
    pub deletes: usize,
}

impl PlanSummary {
    /// True when applying the plan would not touch the scheduler
    pub fn is_noop(&self) -> bool {
        self.creates == 0 && self.recreates == 0 && self.deletes == 0
    }
}

impl ReconciliationPlan {
    pub fn summary(&self) -> PlanSummary {
        let recreates = self
            .to_update
            .iter()
            .filter(|u| u.comparison.requires_recreate())
            .count();

        PlanSummary {
            creates: self.to_create.len(),
            recreates,
            unchanged: self.to_update.len() - recreates,
            deletes: self.to_delete.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Diff engine for generating reconciliation plans
#[derive(Debug, Default)]
pub struct DiffEngine;

impl DiffEngine {
    pub fn new() -> Self {
        Self
    }

    /// Match desired batch files to existing tasks by case-insensitive name.
    /// Unmatched files are created, unmatched tasks deleted.
    pub fn generate_plan(
        &self,
        desired: Vec<BatchFile>,
        existing: Vec<ScheduledTask>,
    ) -> ReconciliationPlan {
        let mut existing_by_name: HashMap<String, ScheduledTask> = existing
            .into_iter()
            .map(|task| (task.name.to_lowercase(), task))
            .collect();

        let mut plan = ReconciliationPlan::default();

        for file in desired {
            match existing_by_name.remove(&file.task_key()) {
                Some(task) => plan.to_update.push(TaskUpdate::new(task, file)),
                None => plan.to_create.push(file),
            }
        }

        plan.to_delete = existing_by_name.into_values().collect();
        plan.to_delete
            .sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));

        plan
    }
}
