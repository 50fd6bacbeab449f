//! stagegrid.toml configuration parser.
//!
//! Every field is optional. A missing file section or key falls back to
//! the defaults below, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::RoundingMode;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagegridConfig {
    pub controller: ControllerConfig,
    pub dispatch: DispatchConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Delay before a rollout blocked on deferred clusters is evaluated again.
    pub requeue_delay_secs: u64,
    /// Interval at which every rollout is enqueued regardless of events.
    pub resync_interval_secs: u64,
    pub rounding: RoundingMode,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            requeue_delay_secs: 60,
            resync_interval_secs: 300,
            rounding: RoundingMode::Down,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub program: String,
    /// `{unit}` is replaced by the unit name.
    pub args: Vec<String>,
    /// Exit code meaning "sync already running"; treated as success.
    pub already_running_exit_code: Option<i32>,
    pub timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            program: "argocd".to_string(),
            args: ["app", "sync", "{unit}", "--async", "--prune"]
                .into_iter()
                .map(String::from)
                .collect(),
            already_running_exit_code: Some(20),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8480,
            data_dir: PathBuf::from("/var/lib/stagegrid"),
        }
    }
}

impl StagegridConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate a TOML document.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: StagegridConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, otherwise the defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.dispatch.program.trim().is_empty() {
            anyhow::bail!("dispatch.program must not be empty");
        }
        if self.dispatch.timeout_secs == 0 {
            anyhow::bail!("dispatch.timeout_secs must be greater than zero");
        }
        if self.controller.resync_interval_secs == 0 {
            anyhow::bail!("controller.resync_interval_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn requeue_delay(&self) -> Duration {
        Duration::from_secs(self.controller.requeue_delay_secs)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.controller.resync_interval_secs)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch.timeout_secs)
    }
}
