use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::error::{Result, SchedulerError};
use crate::trigger::TriggerDescriptor;

/// Run state reported by the task scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum TaskState {
    #[default]
    Unknown,
    Disabled,
    Queued,
    Ready,
    Running,
}

impl TaskState {
    /// Running or about to run, so it has to be stopped before removal
    pub fn is_active(&self) -> bool {
        matches!(self, TaskState::Running | TaskState::Queued)
    }

    fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "disabled" => TaskState::Disabled,
            "queued" => TaskState::Queued,
            "ready" => TaskState::Ready,
            "running" => TaskState::Running,
            _ => TaskState::Unknown,
        }
    }

    /// Numeric values of the CIM `StateEnum`
    fn from_code(code: i64) -> Self {
        match code {
            1 => TaskState::Disabled,
            2 => TaskState::Queued,
            3 => TaskState::Ready,
            4 => TaskState::Running,
            _ => TaskState::Unknown,
        }
    }
}

impl<'de> Deserialize<'de> for TaskState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Code(i64),
            Name(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Code(code) => TaskState::from_code(code),
            Raw::Name(name) => TaskState::from_name(&name),
        })
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Unknown => "Unknown",
            TaskState::Disabled => "Disabled",
            TaskState::Queued => "Queued",
            TaskState::Ready => "Ready",
            TaskState::Running => "Running",
        };
        f.write_str(name)
    }
}

/// A task that exists in the scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub name: String,
    /// Folder path with leading and trailing backslash, e.g. `\Batch\`
    pub folder: String,
    pub enabled: bool,
    pub state: TaskState,
    /// `RegistrationInfo/Documentation`, holds the content hash of the source file
    pub documentation: Option<String>,
}

impl ScheduledTask {
    /// Full scheduler path of the task
    pub fn path(&self) -> String {
        format!("{}{}", self.folder, self.name)
    }
}

/// Normalize a scheduler folder to `\A\B\` form; empty input is the root folder
pub fn normalize_folder(folder: &str) -> String {
    let parts: Vec<&str> = folder
        .split(['\\', '/'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();

    if parts.is_empty() {
        "\\".to_string()
    } else {
        format!("\\{}\\", parts.join("\\"))
    }
}

/// Principal a registered task runs as
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunAs {
    System,
    LocalService,
    NetworkService,
    User {
        account: String,
        #[serde(skip_serializing)]
        password: Option<String>,
    },
}

impl RunAs {
    /// Map an account name from the command line. `SYSTEM`, `LOCALSERVICE` and
    /// `NETWORKSERVICE` are built-in service accounts that never take a password.
    pub fn parse(account: &str, password: Option<String>) -> Result<Self> {
        let account = account.trim();
        if account.is_empty() {
            return Err(SchedulerError::Validation(
                "run-as account must not be empty".to_string(),
            ));
        }

        let service = match account.to_ascii_uppercase().as_str() {
            "SYSTEM" => Some(RunAs::System),
            "LOCALSERVICE" => Some(RunAs::LocalService),
            "NETWORKSERVICE" => Some(RunAs::NetworkService),
            _ => None,
        };

        Ok(match service {
            Some(run_as) => run_as,
            None => RunAs::User {
                account: account.to_string(),
                password: password.filter(|p| !p.is_empty()),
            },
        })
    }

    /// Account name as the scheduler expects it in `Principal/UserId`
    pub fn principal(&self) -> &str {
        match self {
            RunAs::System => "NT AUTHORITY\\SYSTEM",
            RunAs::LocalService => "NT AUTHORITY\\LOCALSERVICE",
            RunAs::NetworkService => "NT AUTHORITY\\NETWORKSERVICE",
            RunAs::User { account, .. } => account,
        }
    }

    pub fn password(&self) -> Option<&str> {
        match self {
            RunAs::User { password, .. } => password.as_deref(),
            _ => None,
        }
    }

    pub fn is_service_account(&self) -> bool {
        !matches!(self, RunAs::User { .. })
    }
}

impl fmt::Debug for RunAs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunAs::User { account, password } => f
                .debug_struct("User")
                .field("account", account)
                .field("password", &password.as_ref().map(|_| "<redacted>"))
                .finish(),
            other => f.write_str(other.principal()),
        }
    }
}

/// Everything needed to register one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRegistration {
    pub folder: String,
    pub name: String,
    pub executable: PathBuf,
    pub working_directory: PathBuf,
    pub triggers: Vec<TriggerDescriptor>,
    pub description: String,
    pub documentation: Option<String>,
    pub run_as: RunAs,
}

/// Remote host and credentials for the scheduler connection
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub host: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
