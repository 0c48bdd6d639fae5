use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Authentication failed (status {status})")]
    Auth { status: u16 },

    #[error("Project not found: {0}")]
    NotFound(String),

    #[error("Rate limited by the API")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Archive rejected: {0}")]
    Payload(String),

    #[error("Transient API failure: {0}")]
    Transient(String),

    #[error("API request rejected (status {status}): {body}")]
    Fatal { status: u16, body: String },

    #[error("Download link expired for {0}")]
    Expired(String),

    #[error("Job still running after {attempts} status polls")]
    Timeout { attempts: u32 },

    #[error("Job reported failed by the platform")]
    JobFailed,

    #[error("File already exists: {0}")]
    FileExists(PathBuf),

    #[error("Template error in '{template}': {reason}")]
    Template { template: String, reason: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Invalid project pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl Error {
    /// Transient failures may be retried in place; everything else escalates.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
