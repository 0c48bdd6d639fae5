//! Workflow behavior against a scripted in-memory job client.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use glexport::{
    Config, Error, ExportJob, ExportPoll, ExportWorkflow, ImportJob, ImportWorkflow, JobClient,
    JobStatus, PollPolicy, ProjectRef, Result,
};
use tempfile::TempDir;

const BASE_CONFIG: &str = r#"
gitlab:
  access:
    gitlab_url: https://gitlab.example.com
    token: secret
  max_tries_number: 5
  wait_between_tries: 0
backup:
  destination: /tmp/replaced-in-tests
  backup_name: "backup-{PROJECT_NAME}.tar.gz"
  backup_time_format: "%Y%m%d"
"#;

fn test_config(destination: &Path) -> Config {
    let mut config: Config = serde_yaml::from_str(BASE_CONFIG).unwrap();
    config.backup.destination = destination.to_path_buf();
    config
}

fn instant_policy() -> PollPolicy {
    PollPolicy {
        interval: Duration::ZERO,
        max_attempts: 5,
        transient_retries: 2,
    }
}

fn pending(status: JobStatus) -> Result<ExportPoll> {
    Ok(ExportPoll {
        status,
        download_url: None,
    })
}

fn finished() -> Result<ExportPoll> {
    Ok(ExportPoll {
        status: JobStatus::Finished,
        download_url: Some("https://gitlab.example.com/dl".to_string()),
    })
}

/// Scripted [`JobClient`]: polls are served from queues, downloads and
/// uploads are counted so tests can assert on them.
#[derive(Default)]
struct ScriptedClient {
    export_polls: Mutex<VecDeque<Result<ExportPoll>>>,
    import_polls: Mutex<VecDeque<Result<JobStatus>>>,
    import_start_error: Mutex<Option<Error>>,
    fetch_calls: AtomicUsize,
    uploaded: Mutex<Option<Vec<u8>>>,
}

impl ScriptedClient {
    fn exporting(polls: Vec<Result<ExportPoll>>) -> Self {
        Self {
            export_polls: Mutex::new(polls.into()),
            ..Self::default()
        }
    }

    fn importing(polls: Vec<Result<JobStatus>>) -> Self {
        Self {
            import_polls: Mutex::new(polls.into()),
            ..Self::default()
        }
    }

    fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobClient for ScriptedClient {
    async fn start_export(&self, project: &ProjectRef) -> Result<ExportJob> {
        Ok(ExportJob::new(project.clone()))
    }

    async fn poll_export(&self, _job: &ExportJob) -> Result<ExportPoll> {
        self.export_polls
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected extra export poll")
    }

    async fn fetch_artifact(&self, _job: &ExportJob) -> Result<Vec<u8>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(b"archive-bytes".to_vec())
    }

    async fn start_import(&self, project: &ProjectRef, archive: Vec<u8>) -> Result<ImportJob> {
        if let Some(e) = self.import_start_error.lock().unwrap().take() {
            return Err(e);
        }
        *self.uploaded.lock().unwrap() = Some(archive);
        Ok(ImportJob::new(project.clone(), Some(1)))
    }

    async fn poll_import(&self, _job: &ImportJob) -> Result<JobStatus> {
        self.import_polls
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected extra import poll")
    }
}

#[tokio::test]
async fn test_finished_on_second_poll_downloads_exactly_once() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    let client = ScriptedClient::exporting(vec![pending(JobStatus::Started), finished()]);
    let project = ProjectRef::new("group/proj");

    let report = ExportWorkflow::new(&client, &config)
        .with_policy(instant_policy())
        .run(std::slice::from_ref(&project))
        .await;

    assert!(report.all_succeeded());
    assert_eq!(client.fetches(), 1);

    let saved = temp.path().join("backup-proj.tar.gz");
    assert_eq!(std::fs::read(&saved).unwrap(), b"archive-bytes");
}

#[tokio::test]
async fn test_failed_job_never_fetches_artifact() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    let client = ScriptedClient::exporting(vec![
        pending(JobStatus::Started),
        pending(JobStatus::Failed),
    ]);
    let project = ProjectRef::new("group/proj");

    let report = ExportWorkflow::new(&client, &config)
        .with_policy(instant_policy())
        .run(std::slice::from_ref(&project))
        .await;

    assert_eq!(client.fetches(), 0);
    let outcome = &report.projects[0].outcome;
    assert!(matches!(outcome, Err(Error::JobFailed)));
}

#[tokio::test]
async fn test_transient_poll_failure_retries_to_one_success() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    let client = ScriptedClient::exporting(vec![
        Err(Error::Transient("connection reset".to_string())),
        pending(JobStatus::Queued),
        finished(),
    ]);
    let project = ProjectRef::new("group/proj");

    let report = ExportWorkflow::new(&client, &config)
        .with_policy(instant_policy())
        .run(std::slice::from_ref(&project))
        .await;

    assert!(report.all_succeeded());
    assert_eq!(client.fetches(), 1);
}

#[tokio::test]
async fn test_transient_failures_beyond_budget_fail_the_project() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    let client = ScriptedClient::exporting(vec![
        Err(Error::Transient("reset".to_string())),
        Err(Error::Transient("reset".to_string())),
        Err(Error::Transient("reset".to_string())),
    ]);
    let project = ProjectRef::new("group/proj");

    let policy = PollPolicy {
        transient_retries: 2,
        ..instant_policy()
    };
    let report = ExportWorkflow::new(&client, &config)
        .with_policy(policy)
        .run(std::slice::from_ref(&project))
        .await;

    assert_eq!(client.fetches(), 0);
    assert!(matches!(
        report.projects[0].outcome,
        Err(Error::Transient(_))
    ));
}

#[tokio::test]
async fn test_job_stuck_in_progress_times_out() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    let client = ScriptedClient::exporting(vec![
        pending(JobStatus::Started),
        pending(JobStatus::Started),
        pending(JobStatus::Started),
        pending(JobStatus::Started),
        pending(JobStatus::Started),
    ]);
    let project = ProjectRef::new("group/proj");

    let report = ExportWorkflow::new(&client, &config)
        .with_policy(instant_policy())
        .run(std::slice::from_ref(&project))
        .await;

    assert_eq!(client.fetches(), 0);
    assert!(matches!(
        report.projects[0].outcome,
        Err(Error::Timeout { attempts: 5 })
    ));
}

#[tokio::test]
async fn test_rate_limit_delays_count_against_the_poll_budget() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    let polls = (0..5)
        .map(|_| {
            Err(Error::RateLimited {
                retry_after: Some(Duration::ZERO),
            })
        })
        .collect();
    let client = ScriptedClient::exporting(polls);
    let project = ProjectRef::new("group/proj");

    let report = ExportWorkflow::new(&client, &config)
        .with_policy(instant_policy())
        .run(std::slice::from_ref(&project))
        .await;

    assert!(matches!(
        report.projects[0].outcome,
        Err(Error::Timeout { .. })
    ));
}

#[tokio::test]
async fn test_existing_destination_without_force_fails() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    let existing = temp.path().join("backup-proj.tar.gz");
    std::fs::write(&existing, b"old").unwrap();

    let client = ScriptedClient::exporting(vec![finished()]);
    let project = ProjectRef::new("group/proj");

    let report = ExportWorkflow::new(&client, &config)
        .with_policy(instant_policy())
        .run(std::slice::from_ref(&project))
        .await;

    assert!(matches!(
        report.projects[0].outcome,
        Err(Error::FileExists(_))
    ));
    assert_eq!(std::fs::read(&existing).unwrap(), b"old");
}

#[tokio::test]
async fn test_existing_destination_with_force_is_replaced() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    let existing = temp.path().join("backup-proj.tar.gz");
    std::fs::write(&existing, b"old").unwrap();

    let client = ScriptedClient::exporting(vec![finished()]);
    let project = ProjectRef::new("group/proj");

    let report = ExportWorkflow::new(&client, &config)
        .with_policy(instant_policy())
        .with_force(true)
        .run(std::slice::from_ref(&project))
        .await;

    assert!(report.all_succeeded());
    assert_eq!(std::fs::read(&existing).unwrap(), b"archive-bytes");
}

#[tokio::test]
async fn test_one_failing_project_does_not_block_the_next() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    let client = ScriptedClient::exporting(vec![pending(JobStatus::Failed), finished()]);
    let projects = vec![ProjectRef::new("group/bad"), ProjectRef::new("group/good")];

    let report = ExportWorkflow::new(&client, &config)
        .with_policy(instant_policy())
        .run(&projects)
        .await;

    assert!(!report.all_succeeded());
    assert!(report.projects[0].outcome.is_err());
    assert!(report.projects[1].outcome.is_ok());
    assert_eq!(report.failures().count(), 1);
    assert!(temp.path().join("backup-good.tar.gz").exists());
}

#[tokio::test]
async fn test_project_dirs_nest_backups_under_the_namespace() {
    let temp = TempDir::new().unwrap();
    let mut config = test_config(temp.path());
    config.backup.project_dirs = true;

    let client = ScriptedClient::exporting(vec![finished()]);
    let project = ProjectRef::new("group/proj");

    let report = ExportWorkflow::new(&client, &config)
        .with_policy(instant_policy())
        .run(std::slice::from_ref(&project))
        .await;

    assert!(report.all_succeeded());
    assert!(temp.path().join("group/proj/backup-proj.tar.gz").exists());
}

#[tokio::test]
async fn test_plan_resolves_destinations_without_side_effects() {
    let temp = TempDir::new().unwrap();
    let mut config = test_config(temp.path());
    config.backup.backup_name = "gitlab-com-{PROJECT_NAME}-{TIME}.tar.gz".to_string();

    let client = ScriptedClient::default();
    let workflow = ExportWorkflow::new(&client, &config).with_policy(instant_policy());
    let plan = workflow
        .plan(&[ProjectRef::new("rvojcik/example-project")])
        .unwrap();

    assert_eq!(plan.len(), 1);
    let file_name = plan[0].1.file_name().unwrap().to_string_lossy().into_owned();
    assert!(file_name.starts_with("gitlab-com-example-project-"));
    assert!(file_name.ends_with(".tar.gz"));
    assert_eq!(client.fetches(), 0);
    assert!(std::fs::read_dir(temp.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn test_import_uploads_archive_and_polls_to_done() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("proj.tar.gz");
    std::fs::write(&archive, b"exported-project").unwrap();

    let client = ScriptedClient::importing(vec![
        Ok(JobStatus::Queued),
        Ok(JobStatus::Started),
        Ok(JobStatus::Finished),
    ]);
    let project = ProjectRef::new("group/proj");

    ImportWorkflow::new(&client)
        .with_policy(instant_policy())
        .run(&project, &archive)
        .await
        .unwrap();

    assert_eq!(
        client.uploaded.lock().unwrap().as_deref(),
        Some(b"exported-project".as_slice())
    );
}

#[tokio::test]
async fn test_import_preserves_payload_rejection_reason() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("proj.tar.gz");
    std::fs::write(&archive, b"junk").unwrap();

    let client = ScriptedClient::default();
    *client.import_start_error.lock().unwrap() =
        Some(Error::Payload("archive is corrupt".to_string()));
    let project = ProjectRef::new("group/proj");

    let err = ImportWorkflow::new(&client)
        .with_policy(instant_policy())
        .run(&project, &archive)
        .await
        .unwrap_err();

    match err {
        Error::Payload(reason) => assert_eq!(reason, "archive is corrupt"),
        other => panic!("expected Payload error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_import_job_failure_is_terminal() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("proj.tar.gz");
    std::fs::write(&archive, b"exported-project").unwrap();

    let client = ScriptedClient::importing(vec![
        Ok(JobStatus::Started),
        Ok(JobStatus::Failed),
    ]);
    let project = ProjectRef::new("group/proj");

    let err = ImportWorkflow::new(&client)
        .with_policy(instant_policy())
        .run(&project, &archive)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::JobFailed));
}

#[tokio::test]
async fn test_import_of_missing_archive_fails_before_upload() {
    let client = ScriptedClient::default();
    let project = ProjectRef::new("group/proj");

    let err = ImportWorkflow::new(&client)
        .with_policy(instant_policy())
        .run(&project, Path::new("/nonexistent/archive.tar.gz"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Io(_)));
    assert!(client.uploaded.lock().unwrap().is_none());
}
