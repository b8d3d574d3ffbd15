//! Task scheduler backend driving the `ScheduledTasks` PowerShell module over a CIM session

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use super::task_xml;
use super::types::{normalize_folder, ConnectionInfo, ScheduledTask, TaskRegistration, TaskState};
use super::TaskScheduler;
use crate::error::{Result, SchedulerError};

// Hides the console window of the child process on Windows
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

const ENV_HOST: &str = "TASKBELT_CIM_HOST";
const ENV_USERNAME: &str = "TASKBELT_CIM_USERNAME";
const ENV_PASSWORD: &str = "TASKBELT_CIM_PASSWORD";
const ENV_TASK_XML: &str = "TASKBELT_TASK_XML";
const ENV_RUN_AS_PASSWORD: &str = "TASKBELT_RUN_AS_PASSWORD";

/// Opens the CIM session every script runs against. Credentials travel in
/// environment variables so they never appear on a command line.
const SESSION_PRELUDE: &str = r#"$ErrorActionPreference = 'Stop'
$secure = ConvertTo-SecureString $env:TASKBELT_CIM_PASSWORD -AsPlainText -Force
$credential = New-Object System.Management.Automation.PSCredential($env:TASKBELT_CIM_USERNAME, $secure)
$session = New-CimSession -ComputerName $env:TASKBELT_CIM_HOST -Credential $credential
"#;

/// Quote a value as a PowerShell single-quoted string literal
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `-EncodedCommand` takes base64 over UTF-16LE
pub fn encode_command(script: &str) -> String {
    let bytes: Vec<u8> = script
        .encode_utf16()
        .flat_map(|unit| unit.to_le_bytes())
        .collect();
    BASE64.encode(bytes)
}

fn wrap_in_session(body: &str) -> String {
    format!(
        "{}try {{\n{}\n}} finally {{\nRemove-CimSession -CimSession $session\n}}\n",
        SESSION_PRELUDE, body
    )
}

fn task_selector(task: &ScheduledTask) -> String {
    format!(
        "-CimSession $session -TaskPath {} -TaskName {}",
        quote(&task.folder),
        quote(&task.name)
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TaskRecord {
    name: String,
    folder: String,
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default)]
    state: TaskState,
    #[serde(default)]
    documentation: Option<String>,
}

impl From<TaskRecord> for ScheduledTask {
    fn from(record: TaskRecord) -> Self {
        let enabled = record
            .enabled
            .unwrap_or(record.state != TaskState::Disabled);
        Self {
            name: record.name,
            folder: normalize_folder(&record.folder),
            enabled,
            state: record.state,
            documentation: record.documentation.filter(|d| !d.trim().is_empty()),
        }
    }
}

/// Parse the JSON emitted by the list script
pub fn parse_task_list(json: &str) -> Result<Vec<ScheduledTask>> {
    let json = json.trim();
    if json.is_empty() {
        return Ok(Vec::new());
    }
    let records: Vec<TaskRecord> = serde_json::from_str(json)?;
    Ok(records.into_iter().map(ScheduledTask::from).collect())
}

/// Task scheduler on a (possibly remote) Windows host
#[derive(Debug, Clone)]
pub struct PowerShellScheduler {
    connection: ConnectionInfo,
    executable: String,
}

/// Builder for [`PowerShellScheduler`]
#[derive(Debug, Clone)]
pub struct PowerShellSchedulerBuilder {
    connection: ConnectionInfo,
    executable: String,
}

impl PowerShellSchedulerBuilder {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            connection: ConnectionInfo {
                host: host.into(),
                username: String::new(),
                password: String::new(),
            },
            executable: "powershell".to_string(),
        }
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.connection.username = username.into();
        self.connection.password = password.into();
        self
    }

    /// PowerShell executable, `powershell` by default (`pwsh` also works)
    pub fn executable(mut self, executable: impl Into<String>) -> Self {
        self.executable = executable.into();
        self
    }

    /// Probe the host once; a failure here aborts the run
    pub async fn connect(self) -> Result<PowerShellScheduler> {
        if self.connection.host.trim().is_empty() {
            return Err(SchedulerError::Validation(
                "scheduler host must not be empty".to_string(),
            ));
        }
        if self.connection.username.trim().is_empty() {
            return Err(SchedulerError::Validation(
                "scheduler username must not be empty".to_string(),
            ));
        }

        let scheduler = PowerShellScheduler {
            connection: self.connection,
            executable: self.executable,
        };

        let probe = "Get-ScheduledTask -CimSession $session -TaskPath '\\' -ErrorAction SilentlyContinue | Select-Object -First 1 | Out-Null";
        scheduler
            .run(probe, &[])
            .await
            .map_err(|e| SchedulerError::Connection {
                host: scheduler.connection.host.clone(),
                message: e.to_string(),
            })?;

        info!(host = %scheduler.connection.host, "Connected to task scheduler");
        Ok(scheduler)
    }
}

impl PowerShellScheduler {
    pub fn builder(host: impl Into<String>) -> PowerShellSchedulerBuilder {
        PowerShellSchedulerBuilder::new(host)
    }

    pub fn host(&self) -> &str {
        &self.connection.host
    }

    /// Run `body` inside a fresh CIM session and return stdout
    async fn run(&self, body: &str, extra_env: &[(&str, &str)]) -> Result<String> {
        let script = wrap_in_session(body);
        let encoded = encode_command(&script);
        debug!(host = %self.connection.host, "Running PowerShell: {}", body);

        let mut command = Command::new(&self.executable);
        command
            .args([
                "-NoProfile",
                "-NonInteractive",
                "-ExecutionPolicy",
                "Bypass",
                "-EncodedCommand",
                encoded.as_str(),
            ])
            .env(ENV_HOST, &self.connection.host)
            .env(ENV_USERNAME, &self.connection.username)
            .env(ENV_PASSWORD, &self.connection.password)
            .kill_on_drop(true);
        for (name, value) in extra_env {
            command.env(name, value);
        }
        #[cfg(windows)]
        command.creation_flags(CREATE_NO_WINDOW);

        let output = command.output().await?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(SchedulerError::CommandFailed {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl TaskScheduler for PowerShellScheduler {
    async fn list_tasks(&self, folder: &str) -> Result<Vec<ScheduledTask>> {
        let folder = normalize_folder(folder);
        let body = format!(
            "$tasks = @(Get-ScheduledTask -CimSession $session -TaskPath {} -ErrorAction SilentlyContinue)\n\
             $records = @($tasks | ForEach-Object {{ [pscustomobject]@{{ Name = $_.TaskName; Folder = $_.TaskPath; \
             Enabled = [bool]$_.Settings.Enabled; State = \"$($_.State)\"; Documentation = $_.Documentation }} }})\n\
             ConvertTo-Json -InputObject $records -Compress -Depth 3",
            quote(&folder)
        );
        let stdout = self.run(&body, &[]).await?;
        let tasks = parse_task_list(&stdout)?;
        // -TaskPath matches exactly, but guard against hosts returning nested folders.
        Ok(tasks
            .into_iter()
            .filter(|task| task.folder.eq_ignore_ascii_case(&folder))
            .collect())
    }

    async fn stop(&self, task: &ScheduledTask) -> Result<()> {
        let body = format!("Stop-ScheduledTask {}", task_selector(task));
        self.run(&body, &[]).await.map(|_| ())
    }

    async fn set_enabled(&self, task: &ScheduledTask, enabled: bool) -> Result<()> {
        let verb = if enabled { "Enable" } else { "Disable" };
        let body = format!("{}-ScheduledTask {} | Out-Null", verb, task_selector(task));
        self.run(&body, &[]).await.map(|_| ())
    }

    async fn delete(&self, task: &ScheduledTask) -> Result<()> {
        let body = format!(
            "Unregister-ScheduledTask {} -Confirm:$false",
            task_selector(task)
        );
        self.run(&body, &[]).await.map(|_| ())
    }

    async fn register(&self, registration: &TaskRegistration) -> Result<ScheduledTask> {
        let folder = normalize_folder(&registration.folder);
        let xml = task_xml::render(registration);

        let mut body = format!(
            "Register-ScheduledTask -CimSession $session -TaskPath {} -TaskName {} -Xml $env:{} -User {}",
            quote(&folder),
            quote(&registration.name),
            ENV_TASK_XML,
            quote(registration.run_as.principal())
        );
        let mut env = vec![(ENV_TASK_XML, xml.as_str())];
        if let Some(password) = registration.run_as.password() {
            body.push_str(&format!(" -Password $env:{}", ENV_RUN_AS_PASSWORD));
            env.push((ENV_RUN_AS_PASSWORD, password));
        }
        body.push_str(" | Out-Null");

        self.run(&body, &env).await?;

        Ok(ScheduledTask {
            name: registration.name.clone(),
            folder,
            enabled: true,
            state: TaskState::Ready,
            documentation: registration.documentation.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_doubles_single_quotes() {
        assert_eq!(quote("O'Brien"), "'O''Brien'");
        assert_eq!(quote("\\Batch\\"), "'\\Batch\\'");
    }

    #[test]
    fn test_encode_command_is_utf16le_base64() {
        // "ab" -> 61 00 62 00
        assert_eq!(encode_command("ab"), "YQBiAA==");
    }

    #[test]
    fn test_parse_task_list() {
        let json = r#"[{"Name":"backup","Folder":"\\Batch\\","Enabled":true,"State":"Ready","Documentation":"abc"},
                       {"Name":"old","Folder":"\\Batch","Enabled":false,"State":1,"Documentation":""}]"#;
        let tasks = parse_task_list(json).unwrap();

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].documentation.as_deref(), Some("abc"));
        assert_eq!(tasks[0].state, TaskState::Ready);
        assert_eq!(tasks[1].folder, "\\Batch\\");
        assert_eq!(tasks[1].state, TaskState::Disabled);
        assert!(!tasks[1].enabled);
        assert_eq!(tasks[1].documentation, None);
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(parse_task_list("").unwrap().is_empty());
        assert!(parse_task_list("[]").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_connect_requires_host_and_username() {
        let result = PowerShellScheduler::builder("").credentials("u", "p").connect().await;
        assert!(matches!(result, Err(SchedulerError::Validation(_))));

        let result = PowerShellScheduler::builder("host").connect().await;
        assert!(matches!(result, Err(SchedulerError::Validation(_))));
    }
}
