//! Configuration loading.
//!
//! Loaded once from a YAML file at startup and passed read-only into the
//! workflows.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::workflow::PollPolicy;

/// Main configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub gitlab: GitlabConfig,
    pub backup: BackupConfig,
    /// Optional relay of finished archives to a remote host.
    #[serde(default)]
    pub transport: Option<TransportConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GitlabConfig {
    pub access: AccessConfig,
    /// Patterns selecting which projects to export.
    #[serde(default)]
    pub projects: Vec<String>,
    /// Patterns removing projects from the selection.
    #[serde(default)]
    pub exclude_projects: Vec<String>,
    /// Restrict the platform listing to projects the token is a member of.
    #[serde(default = "default_true")]
    pub membership: bool,
    #[serde(default)]
    pub include_archived: bool,
    /// Seconds to pause between consecutive project exports.
    #[serde(default)]
    pub wait_between_exports: u64,
    /// Maximum number of status polls per job.
    #[serde(default = "default_max_tries")]
    pub max_tries_number: u32,
    /// Seconds between consecutive status polls.
    #[serde(default = "default_wait_between_tries")]
    pub wait_between_tries: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccessConfig {
    pub gitlab_url: String,
    pub token: String,
    #[serde(default = "default_true")]
    pub ssl_verify: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackupConfig {
    pub destination: PathBuf,
    /// File name template; `{PROJECT_NAME}` and `{TIME}` are substituted.
    #[serde(default = "default_backup_name")]
    pub backup_name: String,
    /// strftime format rendered into `{TIME}`.
    #[serde(default = "default_time_format")]
    pub backup_time_format: String,
    /// Nest each project's backups under its namespaced path.
    #[serde(default)]
    pub project_dirs: bool,
    /// Days a backup may remain before pruning; 0 disables pruning.
    #[serde(default)]
    pub retention_period: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// scp destination, e.g. `backup@host:/srv/backups`.
    pub target: String,
}

fn default_true() -> bool {
    true
}

fn default_max_tries() -> u32 {
    12
}

fn default_wait_between_tries() -> u64 {
    5
}

fn default_backup_name() -> String {
    "{PROJECT_NAME}-{TIME}.tar.gz".to_string()
}

fn default_time_format() -> String {
    "%Y%m%d-%H%M%S".to_string()
}

impl Config {
    /// Load and normalize configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&raw)?;
        config.normalize();
        Ok(config)
    }

    fn normalize(&mut self) {
        let retention = self.backup.retention_period;
        if !retention.is_finite() || retention < 0.0 {
            tracing::warn!(value = retention, "invalid retention_period, disabling pruning");
            self.backup.retention_period = 0.0;
        }
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.gitlab.wait_between_tries),
            max_attempts: self.gitlab.max_tries_number,
            ..PollPolicy::default()
        }
    }
}
