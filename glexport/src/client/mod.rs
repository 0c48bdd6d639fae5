//! HTTP client for the platform's export/import API.
//!
//! Wraps the three asynchronous-job endpoints (request export, request
//! import, check status) plus the artifact download and the paginated
//! project listing. HTTP responses are translated into the crate's error
//! taxonomy here; nothing above this layer sees status codes or raw status
//! strings.

mod job;

pub use job::{ExportJob, ExportPoll, ImportJob, JobStatus};

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{multipart, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};
use crate::project::ProjectRef;

const AUTH_HEADER: &str = "PRIVATE-TOKEN";
const PER_PAGE: u32 = 50;

/// The asynchronous-job operations the workflows depend on. Implemented by
/// [`GitlabClient`]; tests substitute scripted implementations.
#[async_trait]
pub trait JobClient: Send + Sync {
    /// Request a server-side export. The job starts in `Queued`.
    async fn start_export(&self, project: &ProjectRef) -> Result<ExportJob>;

    /// Idempotent status read for an export job.
    async fn poll_export(&self, job: &ExportJob) -> Result<ExportPoll>;

    /// Download the finished artifact. Only valid once the job polled
    /// `Finished`; fails with [`Error::Expired`] when the platform has
    /// already garbage-collected the link.
    async fn fetch_artifact(&self, job: &ExportJob) -> Result<Vec<u8>>;

    /// Upload an archive to the project-creation endpoint.
    async fn start_import(&self, project: &ProjectRef, archive: Vec<u8>) -> Result<ImportJob>;

    /// Idempotent status read for an import job.
    async fn poll_import(&self, job: &ImportJob) -> Result<JobStatus>;
}

#[derive(Deserialize)]
struct ProjectSummary {
    path_with_namespace: String,
}

#[derive(Deserialize)]
struct ExportStatusResponse {
    export_status: Option<String>,
    #[serde(rename = "_links")]
    links: Option<ExportLinks>,
}

#[derive(Deserialize)]
struct ExportLinks {
    api_url: Option<String>,
}

#[derive(Deserialize, Default)]
struct ImportCreated {
    id: Option<u64>,
}

#[derive(Deserialize)]
struct ImportStatusResponse {
    import_status: Option<String>,
}

pub struct GitlabClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
}

impl GitlabClient {
    pub fn new(gitlab_url: &str, token: &str, ssl_verify: bool) -> Result<Self> {
        // Reject malformed URLs at construction.
        Url::parse(gitlab_url)?;
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!ssl_verify)
            .build()
            .map_err(|e| Error::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_url: format!("{}/api/v4", gitlab_url.trim_end_matches('/')),
            token: token.to_string(),
        })
    }

    fn get(&self, url: &str) -> RequestBuilder {
        self.http.get(url).header(AUTH_HEADER, &self.token)
    }

    fn post(&self, url: &str) -> RequestBuilder {
        self.http.post(url).header(AUTH_HEADER, &self.token)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        // Network-level failures are retryable by contract.
        request
            .send()
            .await
            .map_err(|e| Error::Transient(e.to_string()))
    }

    /// List all projects visible to the token, one page at a time, until the
    /// platform returns an empty page.
    pub async fn list_projects(
        &self,
        membership: bool,
        archived: bool,
    ) -> Result<Vec<ProjectRef>> {
        let url = format!("{}/projects", self.api_url);
        let mut projects = Vec::new();
        let mut page = 1u32;

        loop {
            let request = self.get(&url).query(&[
                ("simple", "true".to_string()),
                ("membership", membership.to_string()),
                ("archived", archived.to_string()),
                ("per_page", PER_PAGE.to_string()),
                ("page", page.to_string()),
            ]);
            let response = self.send(request).await?;
            if !response.status().is_success() {
                return Err(api_error(response, "project listing").await);
            }

            let batch: Vec<ProjectSummary> = response
                .json()
                .await
                .map_err(|e| Error::Transient(format!("malformed project listing: {e}")))?;
            if batch.is_empty() {
                break;
            }
            projects.extend(
                batch
                    .into_iter()
                    .map(|p| ProjectRef::new(p.path_with_namespace)),
            );
            page += 1;
        }

        Ok(projects)
    }
}

#[async_trait]
impl JobClient for GitlabClient {
    async fn start_export(&self, project: &ProjectRef) -> Result<ExportJob> {
        let url = format!("{}/projects/{}/export", self.api_url, project.encoded());
        let response = self.send(self.post(&url)).await?;
        if !response.status().is_success() {
            return Err(api_error(response, project.path()).await);
        }
        tracing::debug!(project = %project, "export job accepted");
        Ok(ExportJob::new(project.clone()))
    }

    async fn poll_export(&self, job: &ExportJob) -> Result<ExportPoll> {
        let url = format!("{}/projects/{}/export", self.api_url, job.project.encoded());
        let response = self.send(self.get(&url)).await?;
        if !response.status().is_success() {
            return Err(api_error(response, job.project.path()).await);
        }

        let body: ExportStatusResponse = response
            .json()
            .await
            .map_err(|e| Error::Transient(format!("malformed status response: {e}")))?;
        let status = body
            .export_status
            .as_deref()
            .map(JobStatus::normalize)
            .unwrap_or(JobStatus::Queued);
        Ok(ExportPoll {
            status,
            download_url: body.links.and_then(|l| l.api_url),
        })
    }

    async fn fetch_artifact(&self, job: &ExportJob) -> Result<Vec<u8>> {
        // Prefer the link the status poll published; the canonical download
        // endpoint works for exports the platform still holds.
        let url = job.download_url.clone().unwrap_or_else(|| {
            format!(
                "{}/projects/{}/export/download",
                self.api_url,
                job.project.encoded()
            )
        });
        let response = self.send(self.get(&url)).await?;
        match response.status() {
            s if s.is_success() => response
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| Error::Transient(format!("download interrupted: {e}"))),
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                Err(Error::Expired(job.project.path().to_string()))
            }
            _ => Err(api_error(response, job.project.path()).await),
        }
    }

    async fn start_import(&self, project: &ProjectRef, archive: Vec<u8>) -> Result<ImportJob> {
        let url = format!("{}/projects/import", self.api_url);
        let file = multipart::Part::bytes(archive).file_name(format!("{}.tar.gz", project.name()));
        let mut form = multipart::Form::new()
            .text("path", project.name().to_string())
            .text("overwrite", "true")
            .part("file", file);
        if !project.namespace().is_empty() {
            form = form.text("namespace", project.namespace().to_string());
        }

        let response = self.send(self.post(&url).multipart(form)).await?;
        let status = response.status();
        if status.is_success() {
            let created: ImportCreated = response.json().await.unwrap_or_default();
            tracing::debug!(project = %project, id = ?created.id, "import job accepted");
            return Ok(ImportJob::new(project.clone(), created.id));
        }
        // The platform rejects unusable archives (corrupt, wrong version,
        // name collision) with a message body worth surfacing verbatim.
        match status {
            StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                let body = response.text().await.unwrap_or_default();
                Err(Error::Payload(body))
            }
            _ => Err(api_error(response, project.path()).await),
        }
    }

    async fn poll_import(&self, job: &ImportJob) -> Result<JobStatus> {
        let url = format!("{}/projects/{}/import", self.api_url, job.project.encoded());
        let response = self.send(self.get(&url)).await?;
        if !response.status().is_success() {
            return Err(api_error(response, job.project.path()).await);
        }

        let body: ImportStatusResponse = response
            .json()
            .await
            .map_err(|e| Error::Transient(format!("malformed status response: {e}")))?;
        Ok(body
            .import_status
            .as_deref()
            .map(JobStatus::normalize)
            .unwrap_or(JobStatus::Queued))
    }
}

/// Translate a non-success response into the error taxonomy.
async fn api_error(response: Response, subject: &str) -> Error {
    let status = response.status();
    let retry_after = parse_retry_after(response.headers());
    let body = response.text().await.unwrap_or_default();

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Auth {
            status: status.as_u16(),
        },
        StatusCode::NOT_FOUND => Error::NotFound(subject.to_string()),
        StatusCode::TOO_MANY_REQUESTS => Error::RateLimited { retry_after },
        s if s.is_server_error() => Error::Transient(format!("API returned {s}: {body}")),
        s => Error::Fatal {
            status: s.as_u16(),
            body,
        },
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
