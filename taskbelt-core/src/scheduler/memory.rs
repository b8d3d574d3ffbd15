//! In-process task scheduler

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use tokio::sync::Mutex;
use tracing::debug;

use super::types::{normalize_folder, ScheduledTask, TaskRegistration, TaskState};
use super::TaskScheduler;
use crate::error::{Result, SchedulerError};

/// Scheduler operations, used to inject failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    List,
    Stop,
    SetEnabled,
    Delete,
    Register,
}

impl Operation {
    fn name(&self) -> &'static str {
        match self {
            Operation::List => "list",
            Operation::Stop => "stop",
            Operation::SetEnabled => "set-enabled",
            Operation::Delete => "delete",
            Operation::Register => "register",
        }
    }
}

/// One recorded call against the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerCall {
    List { folder: String },
    Stop { name: String },
    SetEnabled { name: String, enabled: bool },
    Delete { name: String },
    Register { name: String },
}

impl SchedulerCall {
    /// Whether the call changes scheduler state
    pub fn is_mutation(&self) -> bool {
        !matches!(self, SchedulerCall::List { .. })
    }
}

#[derive(Debug, Clone)]
struct StoredTask {
    task: ScheduledTask,
    registration: Option<TaskRegistration>,
}

#[derive(Debug, Default)]
struct State {
    /// Keyed by (folder, lower-cased task name)
    tasks: BTreeMap<(String, String), StoredTask>,
    calls: Vec<SchedulerCall>,
    failures: HashSet<(Operation, String)>,
}

/// Task scheduler kept entirely in memory. Names are case-insensitive, like
/// the Windows scheduler, and registering over an existing task fails.
#[derive(Debug, Default)]
pub struct MemoryScheduler {
    state: Mutex<State>,
}

fn key(folder: &str, name: &str) -> (String, String) {
    (normalize_folder(folder).to_lowercase(), name.to_lowercase())
}

impl MemoryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an existing task
    pub async fn insert_task(
        &self,
        folder: &str,
        name: &str,
        documentation: Option<&str>,
    ) -> ScheduledTask {
        let task = ScheduledTask {
            name: name.to_string(),
            folder: normalize_folder(folder),
            enabled: true,
            state: TaskState::Ready,
            documentation: documentation.map(str::to_string),
        };
        let mut state = self.state.lock().await;
        state.tasks.insert(
            key(folder, name),
            StoredTask {
                task: task.clone(),
                registration: None,
            },
        );
        task
    }

    /// Change the run state of a seeded task
    pub async fn set_state(&self, folder: &str, name: &str, task_state: TaskState) {
        let mut state = self.state.lock().await;
        if let Some(stored) = state.tasks.get_mut(&key(folder, name)) {
            stored.task.state = task_state;
        }
    }

    /// Make `operation` fail for the task named `task_name`; for
    /// [`Operation::List`] the name is the folder
    pub async fn fail_on(&self, operation: Operation, task_name: &str) {
        let mut state = self.state.lock().await;
        let target = if operation == Operation::List {
            normalize_folder(task_name).to_lowercase()
        } else {
            task_name.to_lowercase()
        };
        state.failures.insert((operation, target));
    }

    pub async fn calls(&self) -> Vec<SchedulerCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    pub async fn task(&self, folder: &str, name: &str) -> Option<ScheduledTask> {
        let state = self.state.lock().await;
        state.tasks.get(&key(folder, name)).map(|s| s.task.clone())
    }

    pub async fn registration(&self, folder: &str, name: &str) -> Option<TaskRegistration> {
        let state = self.state.lock().await;
        state
            .tasks
            .get(&key(folder, name))
            .and_then(|s| s.registration.clone())
    }

    fn check(state: &State, operation: Operation, target: &str) -> Result<()> {
        if state.failures.contains(&(operation, target.to_lowercase())) {
            return Err(SchedulerError::Rejected {
                operation: operation.name().to_string(),
                task: target.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl TaskScheduler for MemoryScheduler {
    async fn list_tasks(&self, folder: &str) -> Result<Vec<ScheduledTask>> {
        let folder = normalize_folder(folder);
        let mut state = self.state.lock().await;
        state.calls.push(SchedulerCall::List {
            folder: folder.clone(),
        });
        Self::check(&state, Operation::List, &folder)?;

        let folder_key = folder.to_lowercase();
        Ok(state
            .tasks
            .iter()
            .filter(|((f, _), _)| *f == folder_key)
            .map(|(_, stored)| stored.task.clone())
            .collect())
    }

    async fn stop(&self, task: &ScheduledTask) -> Result<()> {
        let mut state = self.state.lock().await;
        state.calls.push(SchedulerCall::Stop {
            name: task.name.clone(),
        });
        Self::check(&state, Operation::Stop, &task.name)?;

        let stored = state
            .tasks
            .get_mut(&key(&task.folder, &task.name))
            .ok_or_else(|| SchedulerError::NotFound(task.path()))?;
        if stored.task.state.is_active() {
            stored.task.state = TaskState::Ready;
        }
        Ok(())
    }

    async fn set_enabled(&self, task: &ScheduledTask, enabled: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        state.calls.push(SchedulerCall::SetEnabled {
            name: task.name.clone(),
            enabled,
        });
        Self::check(&state, Operation::SetEnabled, &task.name)?;

        let stored = state
            .tasks
            .get_mut(&key(&task.folder, &task.name))
            .ok_or_else(|| SchedulerError::NotFound(task.path()))?;
        stored.task.enabled = enabled;
        stored.task.state = if enabled {
            TaskState::Ready
        } else {
            TaskState::Disabled
        };
        Ok(())
    }

    async fn delete(&self, task: &ScheduledTask) -> Result<()> {
        let mut state = self.state.lock().await;
        state.calls.push(SchedulerCall::Delete {
            name: task.name.clone(),
        });
        Self::check(&state, Operation::Delete, &task.name)?;

        state
            .tasks
            .remove(&key(&task.folder, &task.name))
            .map(|_| ())
            .ok_or_else(|| SchedulerError::NotFound(task.path()))
    }

    async fn register(&self, registration: &TaskRegistration) -> Result<ScheduledTask> {
        let mut state = self.state.lock().await;
        state.calls.push(SchedulerCall::Register {
            name: registration.name.clone(),
        });
        Self::check(&state, Operation::Register, &registration.name)?;

        if registration.triggers.is_empty() {
            return Err(SchedulerError::Validation(format!(
                "task '{}' has no triggers",
                registration.name
            )));
        }

        let task_key = key(&registration.folder, &registration.name);
        if state.tasks.contains_key(&task_key) {
            return Err(SchedulerError::AlreadyExists(registration.name.clone()));
        }

        let task = ScheduledTask {
            name: registration.name.clone(),
            folder: normalize_folder(&registration.folder),
            enabled: true,
            state: TaskState::Ready,
            documentation: registration.documentation.clone(),
        };
        debug!(task = %task.path(), "registered in-memory task");
        state.tasks.insert(
            task_key,
            StoredTask {
                task: task.clone(),
                registration: Some(registration.clone()),
            },
        );
        Ok(task)
    }
}
