use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

mod config;
mod telemetry;

use config::{validate_marker, TaskbeltConfig};
use taskbelt_core::{normalize_folder, PowerShellScheduler, RunAs, TaskScheduler};
use tasksync::{ScanOptions, SyncEngine, SyncOptions, SyncReport};
use telemetry::LoggingOptions;

/// Exit code when `--fail-on-error` is set and a task operation failed
const EXIT_OPERATIONS_FAILED: i32 = 2;

#[derive(Parser)]
#[command(name = "taskbelt")]
#[command(about = "A utility belt for Windows batch script automation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Also write JSON logs to this file, rotated daily
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Write console logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Register, update and remove scheduled tasks from batch file directives
    TaskSchedulerSync(TaskSchedulerSyncArgs),
}

#[derive(Args, Debug)]
struct TaskSchedulerSyncArgs {
    /// Host running the task scheduler
    #[arg(long)]
    host: Option<String>,

    /// Account used to connect to the host
    #[arg(long)]
    username: Option<String>,

    /// Password for the connecting account
    #[arg(long, env = "TASKBELT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Scheduler folder owned by the sync, e.g. \Batch\
    #[arg(long)]
    folder: Option<String>,

    /// Account the tasks run as (SYSTEM, LOCALSERVICE, NETWORKSERVICE or a user)
    #[arg(long)]
    run_as: Option<String>,

    /// Password for a user run-as account
    #[arg(long, env = "TASKBELT_RUN_AS_PASSWORD", hide_env_values = true)]
    run_as_password: Option<String>,

    /// Token following REM/:: that marks a directive
    #[arg(long)]
    marker: Option<String>,

    /// Print the plan without changing any task
    #[arg(long)]
    dry_run: bool,

    /// Exit with code 2 if any task operation failed
    #[arg(long)]
    fail_on_error: bool,

    /// Directories containing the batch files
    #[arg(value_name = "DIR")]
    directories: Vec<PathBuf>,
}

/// Sync settings after merging the command line over the config file
#[derive(Debug)]
struct SyncSettings {
    host: String,
    username: String,
    password: String,
    folder: String,
    run_as: RunAs,
    marker: String,
    dry_run: bool,
    fail_on_error: bool,
    directories: Vec<PathBuf>,
}

fn required(value: Option<String>, flag: &str, key: &str) -> Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .with_context(|| format!("Missing required value: pass {} or set {} in the config file", flag, key))
}

impl SyncSettings {
    fn resolve(args: TaskSchedulerSyncArgs, config: &TaskbeltConfig) -> Result<Self> {
        let scheduler = &config.scheduler;

        let host = required(args.host.or_else(|| scheduler.host.clone()), "--host", "scheduler.host")?;
        let username = required(
            args.username.or_else(|| scheduler.username.clone()),
            "--username",
            "scheduler.username",
        )?;
        let password = args
            .password
            .filter(|p| !p.is_empty())
            .context("Missing required value: pass --password or set TASKBELT_PASSWORD")?;
        let folder = required(
            args.folder.or_else(|| scheduler.folder.clone()),
            "--folder",
            "scheduler.folder",
        )?;
        let run_as = required(
            args.run_as.or_else(|| scheduler.run_as.clone()),
            "--run-as",
            "scheduler.run_as",
        )?;
        let run_as = RunAs::parse(&run_as, args.run_as_password)?;

        let marker = args.marker.unwrap_or_else(|| config.sync.marker.clone());
        validate_marker(&marker)?;

        let directories = if args.directories.is_empty() {
            config.sync.directories.clone()
        } else {
            args.directories
        };
        if directories.is_empty() {
            anyhow::bail!("No directories given: pass at least one DIR or set sync.directories in the config file");
        }

        Ok(Self {
            host,
            username,
            password,
            folder: normalize_folder(&folder),
            run_as,
            marker,
            dry_run: args.dry_run || config.sync.dry_run,
            fail_on_error: args.fail_on_error || config.sync.fail_on_error,
            directories,
        })
    }

    fn sync_options(&self) -> SyncOptions {
        let mut options = SyncOptions::new(&self.folder, self.run_as.clone());
        options.dry_run = self.dry_run;
        options.scan_options = ScanOptions {
            marker: self.marker.clone(),
            ..ScanOptions::default()
        };
        options
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, config_path) = TaskbeltConfig::load_or_default(cli.config.as_deref()).await?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.log_file.is_some() {
        config.logging.file = cli.log_file;
    }
    config.logging.json |= cli.json_logs;
    config.validate()?;

    let guard = telemetry::init_logging(&LoggingOptions {
        level: config.logging.level.clone(),
        file: config.logging.file.clone(),
        json: config.logging.json,
    })?;

    if let Some(path) = &config_path {
        info!("Loaded configuration from {}", path.display());
    }

    let exit_code = match cli.command {
        Commands::TaskSchedulerSync(args) => {
            let settings = SyncSettings::resolve(args, &config)?;
            run_task_scheduler_sync(settings).await?
        }
    };

    // Flush the log file before exiting
    drop(guard);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

async fn run_task_scheduler_sync(settings: SyncSettings) -> Result<i32> {
    info!(
        host = %settings.host,
        folder = %settings.folder,
        run_as = %settings.run_as.principal(),
        dry_run = settings.dry_run,
        "Starting task scheduler sync"
    );

    let scheduler = PowerShellScheduler::builder(settings.host.clone())
        .credentials(settings.username.clone(), settings.password.clone())
        .connect()
        .await
        .with_context(|| format!("Failed to connect to task scheduler on {}", settings.host))?;
    let scheduler: Arc<dyn TaskScheduler> = Arc::new(scheduler);

    let engine = SyncEngine::new(scheduler, settings.sync_options());
    let report = engine.sync(&settings.directories).await?;

    print_report(&report, settings.dry_run)?;
    Ok(exit_code(&report, settings.fail_on_error))
}

fn print_report(report: &SyncReport, dry_run: bool) -> Result<()> {
    for collision in &report.collisions {
        warn!(
            task = %collision.task_name,
            files = collision.files.len(),
            "Skipped colliding batch files"
        );
    }

    if dry_run {
        println!("{}", report.plan.to_json()?);
        let summary = report.plan.summary();
        println!(
            "dry-run: create={} recreate={} unchanged={} delete={}",
            summary.creates, summary.recreates, summary.unchanged, summary.deletes
        );
    }
    debug!(metrics = %report.metrics.to_json()?, "Run metrics");
    println!("{}", report.metrics.summary());
    Ok(())
}

fn exit_code(report: &SyncReport, fail_on_error: bool) -> i32 {
    if fail_on_error && !report.metrics.is_successful() {
        EXIT_OPERATIONS_FAILED
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tasksync::{ReconciliationPlan, SyncMetrics, TaskOperation};

    fn parse(args: &[&str]) -> TaskSchedulerSyncArgs {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::TaskSchedulerSync(args) => args,
        }
    }

    fn full_args() -> Vec<&'static str> {
        vec![
            "taskbelt",
            "task-scheduler-sync",
            "--host",
            "batch01",
            "--username",
            "CORP\\deploy",
            "--password",
            "secret",
            "--folder",
            "Batch",
            "--run-as",
            "system",
            "C:\\scripts",
        ]
    }

    fn report_with_failures(failures: usize) -> SyncReport {
        let mut metrics = SyncMetrics::new();
        for _ in 0..failures {
            metrics.record_failure(TaskOperation::Create, "job", "rejected");
        }
        SyncReport {
            plan: ReconciliationPlan::default(),
            collisions: Vec::new(),
            metrics,
        }
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_resolve_from_command_line() {
        let settings = SyncSettings::resolve(parse(&full_args()), &TaskbeltConfig::default()).unwrap();

        assert_eq!(settings.host, "batch01");
        assert_eq!(settings.folder, "\\Batch\\");
        assert_eq!(settings.run_as, RunAs::System);
        assert_eq!(settings.marker, "taskbelt");
        assert_eq!(settings.directories, vec![PathBuf::from("C:\\scripts")]);
        assert!(!settings.dry_run);
        assert!(!settings.fail_on_error);
    }

    #[test]
    fn test_config_fills_missing_values() {
        let mut config = TaskbeltConfig::default();
        config.scheduler.host = Some("from-config".to_string());
        config.scheduler.username = Some("svc".to_string());
        config.scheduler.folder = Some("\\Ops\\".to_string());
        config.scheduler.run_as = Some("NetworkService".to_string());
        config.sync.directories = vec![PathBuf::from("D:\\jobs")];
        config.sync.fail_on_error = true;

        let args = parse(&["taskbelt", "task-scheduler-sync", "--password", "pw", "--host", "cli-host"]);
        let settings = SyncSettings::resolve(args, &config).unwrap();

        assert_eq!(settings.host, "cli-host");
        assert_eq!(settings.username, "svc");
        assert_eq!(settings.folder, "\\Ops\\");
        assert_eq!(settings.run_as, RunAs::NetworkService);
        assert_eq!(settings.directories, vec![PathBuf::from("D:\\jobs")]);
        assert!(settings.fail_on_error);
    }

    #[test]
    fn test_missing_host_is_an_error() {
        let mut args = full_args();
        args.drain(2..4);
        let error = SyncSettings::resolve(parse(&args), &TaskbeltConfig::default()).unwrap_err();
        assert!(error.to_string().contains("--host"));
    }

    #[test]
    fn test_missing_directories_is_an_error() {
        let mut args = full_args();
        args.pop();
        assert!(SyncSettings::resolve(parse(&args), &TaskbeltConfig::default()).is_err());
    }

    #[test]
    fn test_user_run_as_keeps_password() {
        let mut args = full_args();
        args.splice(11..12, ["CORP\\batch", "--run-as-password", "pw2"]);
        let settings = SyncSettings::resolve(parse(&args), &TaskbeltConfig::default()).unwrap();

        assert_eq!(settings.run_as.principal(), "CORP\\batch");
        assert_eq!(settings.run_as.password(), Some("pw2"));
    }

    #[test]
    fn test_invalid_marker_is_rejected() {
        let mut args = full_args();
        args.extend(["--marker", "two words"]);
        assert!(SyncSettings::resolve(parse(&args), &TaskbeltConfig::default()).is_err());
    }

    #[test]
    fn test_sync_options_carry_marker_and_dry_run() {
        let mut args = full_args();
        args.extend(["--marker", "ops", "--dry-run"]);
        let settings = SyncSettings::resolve(parse(&args), &TaskbeltConfig::default()).unwrap();
        let options = settings.sync_options();

        assert!(options.dry_run);
        assert_eq!(options.folder, "\\Batch\\");
        assert_eq!(options.scan_options.marker, "ops");
    }

    #[test]
    fn test_exit_code_policy() {
        assert_eq!(exit_code(&report_with_failures(0), true), 0);
        assert_eq!(exit_code(&report_with_failures(1), false), 0);
        assert_eq!(exit_code(&report_with_failures(1), true), EXIT_OPERATIONS_FAILED);
    }
}
