//! Job state model for asynchronous server-side operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::project::ProjectRef;

/// Normalized status of a server-side job. The platform's ad hoc status
/// strings are folded into this set at the client boundary so the workflow
/// state machines never match on raw API text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Started,
    Finished,
    Failed,
}

impl JobStatus {
    /// Fold a raw platform status string into the closed set.
    ///
    /// `none` appears before the platform has scheduled the job;
    /// `regeneration_in_progress` while it rebuilds an earlier export. A
    /// string we have never seen is treated as still in progress (the poll
    /// budget bounds the loop either way) and logged.
    pub fn normalize(raw: &str) -> Self {
        match raw {
            "queued" | "scheduled" | "none" | "" => JobStatus::Queued,
            "started" | "regeneration_in_progress" => JobStatus::Started,
            "finished" => JobStatus::Finished,
            "failed" => JobStatus::Failed,
            other => {
                tracing::warn!(status = other, "unrecognized job status, treating as in progress");
                JobStatus::Started
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Started => "started",
            JobStatus::Finished => "finished",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One poll of an export job: the normalized status, plus the download URL
/// once the platform publishes it.
#[derive(Debug, Clone)]
pub struct ExportPoll {
    pub status: JobStatus,
    pub download_url: Option<String>,
}

/// An in-flight export job. The platform addresses export jobs by project
/// path, so the project is the handle. Transitions are driven exclusively
/// by recorded polls; once terminal the job is discarded.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub project: ProjectRef,
    pub status: JobStatus,
    pub last_polled: Option<DateTime<Utc>>,
    pub download_url: Option<String>,
}

impl ExportJob {
    pub fn new(project: ProjectRef) -> Self {
        Self {
            project,
            status: JobStatus::Queued,
            last_polled: None,
            download_url: None,
        }
    }

    pub fn record(&mut self, poll: &ExportPoll) {
        self.status = poll.status;
        self.last_polled = Some(Utc::now());
        if poll.download_url.is_some() {
            self.download_url = poll.download_url.clone();
        }
    }
}

/// An in-flight import job.
#[derive(Debug, Clone)]
pub struct ImportJob {
    pub project: ProjectRef,
    /// Numeric id the platform assigns to the created project, when returned.
    pub id: Option<u64>,
    pub status: JobStatus,
    pub last_polled: Option<DateTime<Utc>>,
}

impl ImportJob {
    pub fn new(project: ProjectRef, id: Option<u64>) -> Self {
        Self {
            project,
            id,
            status: JobStatus::Queued,
            last_polled: None,
        }
    }

    pub fn record(&mut self, status: JobStatus) {
        self.status = status;
        self.last_polled = Some(Utc::now());
    }
}
