//! Agent settings file
//!
//! The settings file tunes the agent. Device identity lives in the device
//! record, not here.

use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{WrapErr, ensure};
use serde::{Deserialize, Serialize};

use fieldlink_core::{DEFAULT_RECORD_PATH, HeartbeatConfig};
use fieldlink_exec::ExecMode;

/// Settings file used when neither `--config` nor the environment names one
pub const DEFAULT_CONFIG_PATH: &str = "/etc/fieldlink/agent.toml";

/// Environment variable naming the settings file
pub const CONFIG_ENV: &str = "FIELDLINK_CONFIG";

/// Top-level configuration for the fieldlink agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub heartbeat: HeartbeatSettings,
    #[serde(default)]
    pub commands: CommandSettings,
    #[serde(default)]
    pub provisioning: ProvisioningSettings,
}

/// Process-level settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Persisted device record
    #[serde(default = "default_record_path")]
    pub record_path: PathBuf,
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Append-mode log file next to stdout logging
    #[serde(default = "default_log_file")]
    pub log_file: Option<PathBuf>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            record_path: default_record_path(),
            log_level: default_log_level(),
            log_file: default_log_file(),
        }
    }
}

fn default_record_path() -> PathBuf {
    PathBuf::from(DEFAULT_RECORD_PATH)
}

fn default_log_level() -> String {
    "info".to_string()
}

#[allow(clippy::unnecessary_wraps)]
fn default_log_file() -> Option<PathBuf> {
    Some(PathBuf::from("/var/log/fieldlink-agent.log"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatSettings {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Granularity of shutdown checks between heartbeats
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            tick_millis: default_tick_millis(),
        }
    }
}

impl HeartbeatSettings {
    #[must_use]
    pub fn to_config(&self) -> HeartbeatConfig {
        HeartbeatConfig {
            interval: Duration::from_secs(self.interval_secs),
            tick: Duration::from_millis(self.tick_millis),
        }
    }
}

fn default_interval_secs() -> u64 {
    60
}

fn default_tick_millis() -> u64 {
    1000
}

/// Remote command execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSettings {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub mode: ExecMode,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            mode: ExecMode::default(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    300
}

/// Provisioning service client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningSettings {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
}

impl Default for ProvisioningSettings {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            poll_interval_secs: default_poll_interval_secs(),
            max_polls: default_max_polls(),
        }
    }
}

fn default_api_version() -> String {
    fieldlink_client::dps::DEFAULT_API_VERSION.to_string()
}

fn default_poll_interval_secs() -> u64 {
    fieldlink_client::dps::DEFAULT_POLL_INTERVAL.as_secs()
}

fn default_max_polls() -> u32 {
    fieldlink_client::dps::DEFAULT_MAX_POLLS
}

/// Which settings file to read, and whether it must exist
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Named on the command line or in the environment
    Explicit(PathBuf),
    /// The default location, used only if present
    Default(PathBuf),
}

impl ConfigSource {
    /// `--config` first, then [`CONFIG_ENV`], then [`DEFAULT_CONFIG_PATH`]
    #[must_use]
    pub fn locate(cli: Option<&Path>, env: Option<&str>) -> Self {
        if let Some(path) = cli {
            return Self::Explicit(path.to_path_buf());
        }
        match env {
            Some(path) if !path.trim().is_empty() => Self::Explicit(PathBuf::from(path.trim())),
            _ => Self::Default(PathBuf::from(DEFAULT_CONFIG_PATH)),
        }
    }
}

impl Settings {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read, parsed or fails validation
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read {}", path.display()))?;
        let settings: Settings = toml::from_str(&content)
            .wrap_err_with(|| format!("failed to parse {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load from `source`, falling back to defaults if the default file is absent
    ///
    /// Returns the file actually read, if any.
    ///
    /// # Errors
    /// An explicit file that is missing or invalid is an error
    pub fn resolve(source: &ConfigSource) -> eyre::Result<(Self, Option<PathBuf>)> {
        match source {
            ConfigSource::Explicit(path) => Ok((Self::load(path)?, Some(path.clone()))),
            ConfigSource::Default(path) if path.exists() => {
                Ok((Self::load(path)?, Some(path.clone())))
            }
            ConfigSource::Default(_) => Ok((Self::default(), None)),
        }
    }

    fn validate(&self) -> eyre::Result<()> {
        ensure!(
            self.heartbeat.interval_secs > 0,
            "heartbeat.interval_secs must be positive"
        );
        ensure!(
            self.heartbeat.tick_millis > 0,
            "heartbeat.tick_millis must be positive"
        );
        ensure!(
            self.commands.timeout_secs > 0,
            "commands.timeout_secs must be positive"
        );
        Ok(())
    }
}
