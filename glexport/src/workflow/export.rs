//! Export workflow: one state machine per project.
//!
//! `PENDING -> POLLING -> DOWNLOADING -> {SAVED, FAILED}`. The artifact is
//! fetched exactly once per finished job and written into place atomically.
//! After every project has reached a terminal state, the retention pruner
//! runs once over the destination directories.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use tempfile::NamedTempFile;
use tokio::time::sleep;

use crate::client::{JobClient, JobStatus};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::naming;
use crate::project::ProjectRef;
use crate::retention;
use crate::transport::Transport;

use super::{BackupArtifact, PollBudget, PollPolicy, ProjectReport, RunReport};

pub struct ExportWorkflow<'a> {
    client: &'a dyn JobClient,
    config: &'a Config,
    policy: PollPolicy,
    transport: Option<&'a dyn Transport>,
    force: bool,
}

impl<'a> ExportWorkflow<'a> {
    pub fn new(client: &'a dyn JobClient, config: &'a Config) -> Self {
        Self {
            client,
            config,
            policy: config.poll_policy(),
            transport: None,
            force: false,
        }
    }

    pub fn with_transport(mut self, transport: Option<&'a dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Resolve the destination file each project would be written to,
    /// without touching the API or the filesystem.
    pub fn plan(&self, projects: &[ProjectRef]) -> Result<Vec<(ProjectRef, PathBuf)>> {
        let now = Local::now();
        projects
            .iter()
            .map(|p| Ok((p.clone(), self.destination_for(p, now)?)))
            .collect()
    }

    /// Export every project in order, then prune expired backups. Failures
    /// are recorded per project and never abort the run.
    pub async fn run(&self, projects: &[ProjectRef]) -> RunReport {
        let mut report = RunReport::default();

        for (i, project) in projects.iter().enumerate() {
            if i > 0 && self.config.gitlab.wait_between_exports > 0 {
                sleep(Duration::from_secs(self.config.gitlab.wait_between_exports)).await;
            }

            tracing::info!(project = %project, "exporting project");
            let outcome = self.export_one(project).await;
            match &outcome {
                Ok(artifact) => {
                    tracing::info!(
                        project = %project,
                        path = %artifact.path.display(),
                        size = artifact.size_bytes,
                        "backup saved"
                    );
                }
                Err(e) => {
                    tracing::error!(project = %project, error = %e, "export failed");
                }
            }
            report.projects.push(ProjectReport {
                project: project.clone(),
                outcome,
            });
        }

        self.prune_destinations(projects);
        report
    }

    async fn export_one(&self, project: &ProjectRef) -> Result<BackupArtifact> {
        let mut job = self.client.start_export(project).await?;

        let mut budget = PollBudget::new(self.policy);
        loop {
            match self.client.poll_export(&job).await {
                Ok(poll) => {
                    job.record(&poll);
                    tracing::debug!(project = %project, status = %poll.status, "export status");
                    match poll.status {
                        JobStatus::Finished => break,
                        JobStatus::Failed => return Err(Error::JobFailed),
                        JobStatus::Queued | JobStatus::Started => budget.wait_pending().await?,
                    }
                }
                Err(Error::RateLimited { retry_after }) => {
                    budget.wait_rate_limited(retry_after).await?;
                }
                Err(e) if e.is_transient() && budget.absorb_transient() => {
                    tracing::warn!(project = %project, error = %e, "transient poll failure, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        let bytes = self.client.fetch_artifact(&job).await?;
        let created_at = Local::now();
        let destination = self.destination_for(project, created_at)?;
        let artifact = save_artifact(project, &destination, &bytes, created_at, self.force)?;

        if let Some(transport) = self.transport {
            // The local copy stays authoritative; a failed relay is reported
            // but does not demote the saved artifact.
            if let Err(e) = transport.ship(&artifact).await {
                tracing::warn!(
                    project = %project,
                    destination = transport.destination(),
                    error = %e,
                    "transport failed, local copy kept"
                );
            }
        }

        Ok(artifact)
    }

    fn destination_for(&self, project: &ProjectRef, now: DateTime<Local>) -> Result<PathBuf> {
        let backup = &self.config.backup;
        let mut dir = backup.destination.clone();
        if backup.project_dirs {
            dir = dir.join(project.path());
        }
        let file = naming::resolve(
            &backup.backup_name,
            project.name(),
            now,
            &backup.backup_time_format,
        )?;
        Ok(dir.join(file))
    }

    fn prune_destinations(&self, projects: &[ProjectRef]) {
        let retention_days = self.config.backup.retention_period;
        if retention_days <= 0.0 {
            return;
        }

        let mut dirs: Vec<PathBuf> = if self.config.backup.project_dirs {
            projects
                .iter()
                .map(|p| self.config.backup.destination.join(p.path()))
                .collect()
        } else {
            vec![self.config.backup.destination.clone()]
        };
        dirs.sort();
        dirs.dedup();

        for dir in dirs {
            if !dir.is_dir() {
                continue;
            }
            match retention::prune(&dir, retention_days) {
                Ok(deleted) => {
                    for path in &deleted {
                        tracing::info!(path = %path.display(), "pruned expired backup");
                    }
                }
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "retention pruning failed");
                }
            }
        }
    }
}

/// Write the artifact bytes via a temp file in the destination directory;
/// the final rename into place is atomic.
fn save_artifact(
    project: &ProjectRef,
    destination: &Path,
    bytes: &[u8],
    created_at: DateTime<Local>,
    force: bool,
) -> Result<BackupArtifact> {
    if destination.exists() && !force {
        return Err(Error::FileExists(destination.to_path_buf()));
    }
    let parent = destination.parent().ok_or_else(|| {
        Error::Config(format!(
            "destination {} has no parent directory",
            destination.display()
        ))
    })?;
    std::fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.persist(destination).map_err(|e| Error::Io(e.error))?;

    Ok(BackupArtifact {
        project: project.clone(),
        created_at,
        path: destination.to_path_buf(),
        size_bytes: bytes.len() as u64,
    })
}
