//! Optional relay of finished archives to a remote host.

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{Error, Result};
use crate::workflow::BackupArtifact;

/// Ships a saved artifact somewhere else. The local copy stays
/// authoritative; implementations must not move or delete it.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn ship(&self, artifact: &BackupArtifact) -> Result<()>;

    /// Human-readable destination for logs.
    fn destination(&self) -> &str;
}

/// Copies artifacts to a remote host with `scp`.
pub struct ScpTransport {
    target: String,
}

impl ScpTransport {
    /// `target` is an scp destination, e.g. `backup@host:/srv/backups`.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

#[async_trait]
impl Transport for ScpTransport {
    async fn ship(&self, artifact: &BackupArtifact) -> Result<()> {
        tracing::debug!(
            path = %artifact.path.display(),
            target = %self.target,
            "copying archive to remote host"
        );
        let status = Command::new("scp")
            .arg("-q")
            .arg("-B")
            .arg(&artifact.path)
            .arg(&self.target)
            .status()
            .await?;

        if !status.success() {
            return Err(Error::Transport(format!(
                "scp to {} exited with {status}",
                self.target
            )));
        }
        Ok(())
    }

    fn destination(&self) -> &str {
        &self.target
    }
}
