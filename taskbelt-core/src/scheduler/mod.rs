//! Task scheduler collaborator
//!
//! The reconciliation engine talks to the scheduler only through the
//! [`TaskScheduler`] trait. Two implementations are provided: a PowerShell
//! backend that drives the `ScheduledTasks` module over a CIM session, and an
//! in-memory scheduler used for tests and offline plans.

pub mod memory;
pub mod powershell;
pub mod task_xml;
pub mod types;

use async_trait::async_trait;

use crate::error::Result;

pub use memory::{MemoryScheduler, Operation, SchedulerCall};
pub use powershell::{PowerShellScheduler, PowerShellSchedulerBuilder};
pub use types::*;

/// Operations the sync engine needs from a task scheduler. Every call is a
/// blocking round trip to the scheduler service; implementations do not retry.
#[async_trait]
pub trait TaskScheduler: Send + Sync {
    /// Tasks directly inside `folder`, not recursing into subfolders
    async fn list_tasks(&self, folder: &str) -> Result<Vec<ScheduledTask>>;

    async fn stop(&self, task: &ScheduledTask) -> Result<()>;

    async fn set_enabled(&self, task: &ScheduledTask, enabled: bool) -> Result<()>;

    async fn delete(&self, task: &ScheduledTask) -> Result<()>;

    async fn register(&self, registration: &TaskRegistration) -> Result<ScheduledTask>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("", "\\" ; "empty is root")]
    #[test_case("\\", "\\" ; "root")]
    #[test_case("Batch", "\\Batch\\" ; "bare name")]
    #[test_case("\\Batch", "\\Batch\\" ; "leading slash only")]
    #[test_case("/Ops/Nightly/", "\\Ops\\Nightly\\" ; "forward slashes")]
    #[test_case("\\\\Ops\\\\Nightly", "\\Ops\\Nightly\\" ; "doubled separators")]
    fn test_normalize_folder(input: &str, expected: &str) {
        assert_eq!(normalize_folder(input), expected);
    }

    #[test_case("SYSTEM", "NT AUTHORITY\\SYSTEM" ; "system")]
    #[test_case("localservice", "NT AUTHORITY\\LOCALSERVICE" ; "local service")]
    #[test_case("NetworkService", "NT AUTHORITY\\NETWORKSERVICE" ; "network service")]
    #[test_case("CORP\\svc-batch", "CORP\\svc-batch" ; "domain user")]
    fn test_run_as_principal(account: &str, principal: &str) {
        let run_as = RunAs::parse(account, Some("secret".to_string())).unwrap();
        assert_eq!(run_as.principal(), principal);
    }

    #[test]
    fn test_service_accounts_drop_password() {
        let run_as = RunAs::parse("system", Some("secret".to_string())).unwrap();
        assert!(run_as.is_service_account());
        assert_eq!(run_as.password(), None);

        let user = RunAs::parse("CORP\\svc", Some("secret".to_string())).unwrap();
        assert_eq!(user.password(), Some("secret"));
        assert!(!format!("{:?}", user).contains("secret"));
    }

    #[test]
    fn test_empty_run_as_is_rejected() {
        assert!(RunAs::parse("  ", None).is_err());
    }

    #[test]
    fn test_task_state_deserializes_codes_and_names() {
        let states: Vec<TaskState> = serde_json::from_str(r#"[3, "Running", "queued", 1, 42]"#).unwrap();
        assert_eq!(
            states,
            vec![
                TaskState::Ready,
                TaskState::Running,
                TaskState::Queued,
                TaskState::Disabled,
                TaskState::Unknown
            ]
        );
        assert!(TaskState::Running.is_active());
        assert!(!TaskState::Ready.is_active());
    }
}
