//! Import workflow for one archive.
//!
//! `PENDING -> UPLOADING -> POLLING -> {DONE, FAILED}`, with the same poll
//! discipline as the export workflow.

use std::path::Path;

use crate::client::{JobClient, JobStatus};
use crate::error::{Error, Result};
use crate::project::ProjectRef;

use super::{PollBudget, PollPolicy};

pub struct ImportWorkflow<'a> {
    client: &'a dyn JobClient,
    policy: PollPolicy,
}

impl<'a> ImportWorkflow<'a> {
    pub fn new(client: &'a dyn JobClient) -> Self {
        Self {
            client,
            policy: PollPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Upload a local archive into `project` and poll the resulting job to
    /// completion.
    pub async fn run(&self, project: &ProjectRef, archive: &Path) -> Result<()> {
        let bytes = tokio::fs::read(archive).await?;
        tracing::info!(
            project = %project,
            archive = %archive.display(),
            size = bytes.len(),
            "uploading archive"
        );
        let mut job = self.client.start_import(project, bytes).await?;

        let mut budget = PollBudget::new(self.policy);
        loop {
            match self.client.poll_import(&job).await {
                Ok(status) => {
                    job.record(status);
                    tracing::debug!(project = %project, status = %status, "import status");
                    match status {
                        JobStatus::Finished => return Ok(()),
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
    }
}
