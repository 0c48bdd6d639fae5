use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use glexport::transport::{ScpTransport, Transport};
use glexport::{select_projects, Config, ExportWorkflow, GitlabClient};

#[derive(Parser, Debug)]
#[command(name = "gitlab-project-export")]
#[command(about = "Export GitLab projects into timestamped backup archives")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Debug logging
    #[arg(short, long)]
    debug: bool,

    /// Overwrite existing backup files
    #[arg(short, long)]
    force: bool,

    /// Print what would be done, without doing it
    #[arg(short, long)]
    noop: bool,
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.debug);

    let config = Config::load(&args.config)
        .with_context(|| format!("loading config {}", args.config.display()))?;

    let client = GitlabClient::new(
        &config.gitlab.access.gitlab_url,
        &config.gitlab.access.token,
        config.gitlab.access.ssl_verify,
    )?;

    tracing::debug!(url = %config.gitlab.access.gitlab_url, "listing projects");
    let all = client
        .list_projects(config.gitlab.membership, config.gitlab.include_archived)
        .await
        .context("listing projects")?;
    let projects = select_projects(
        &all,
        &config.gitlab.projects,
        &config.gitlab.exclude_projects,
    )?;
    if projects.is_empty() {
        bail!("no projects matched the configured patterns");
    }
    tracing::info!(count = projects.len(), "projects selected for export");

    let scp = config
        .transport
        .as_ref()
        .map(|t| ScpTransport::new(t.target.clone()));
    let workflow = ExportWorkflow::new(&client, &config)
        .with_force(args.force)
        .with_transport(scp.as_ref().map(|s| s as &dyn Transport));

    if args.noop {
        println!("Would export {} project(s):", projects.len());
        for (project, destination) in workflow.plan(&projects)? {
            println!("  {} -> {}", project, destination.display());
        }
        return Ok(());
    }

    let report = workflow.run(&projects).await;

    println!();
    println!("Export summary:");
    for entry in &report.projects {
        match &entry.outcome {
            Ok(artifact) => println!(
                "  ok   {} -> {} ({} bytes)",
                entry.project,
                artifact.path.display(),
                artifact.size_bytes
            ),
            Err(e) => println!("  FAIL {}: {}", entry.project, e),
        }
    }

    if !report.all_succeeded() {
        std::process::exit(1);
    }
    Ok(())
}
