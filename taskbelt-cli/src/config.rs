use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use taskbelt_core::DEFAULT_MARKER;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskbeltConfig {
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Connection and registration settings. Passwords are never read from the
/// config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerSettings {
    pub host: Option<String>,
    pub username: Option<String>,
    pub folder: Option<String>,
    pub run_as: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default = "default_marker")]
    pub marker: String,
    #[serde(default)]
    pub directories: Vec<PathBuf>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub fail_on_error: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub json: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            marker: default_marker(),
            directories: Vec::new(),
            dry_run: false,
            fail_on_error: false,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
            json: false,
        }
    }
}

impl TaskbeltConfig {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: TaskbeltConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Load the explicitly named file, else the default location if it
    /// exists, else built-in defaults. Returns where the config came from.
    pub async fn load_or_default(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::load(path).await?, Some(path.to_path_buf())));
        }

        if let Some(path) = default_config_path() {
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Ok((Self::load(&path).await?, Some(path)));
            }
        }

        Ok((Self::default(), None))
    }

    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level '{}', expected one of {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            );
        }

        validate_marker(&self.sync.marker)?;

        for (name, value) in [
            ("scheduler.host", &self.scheduler.host),
            ("scheduler.username", &self.scheduler.username),
            ("scheduler.folder", &self.scheduler.folder),
            ("scheduler.run_as", &self.scheduler.run_as),
        ] {
            if matches!(value, Some(v) if v.trim().is_empty()) {
                anyhow::bail!("{} cannot be empty", name);
            }
        }

        Ok(())
    }
}

pub fn validate_marker(marker: &str) -> Result<()> {
    if marker.is_empty() || marker.chars().any(char::is_whitespace) {
        anyhow::bail!("Directive marker must be a single non-empty token");
    }
    Ok(())
}

/// `<config_dir>/taskbelt/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("taskbelt").join("config.toml"))
}

// Default value functions
fn default_marker() -> String {
    DEFAULT_MARKER.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}
