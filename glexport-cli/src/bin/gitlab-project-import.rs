use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use glexport::{Config, GitlabClient, ImportWorkflow, ProjectRef};

#[derive(Parser, Debug)]
#[command(name = "gitlab-project-import")]
#[command(about = "Import an exported project archive into a GitLab instance")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Path to the exported project archive
    #[arg(short, long)]
    filepath: PathBuf,

    /// Target project path, e.g. group/project
    #[arg(short = 'p', long)]
    project_path: String,

    /// Debug logging
    #[arg(short, long)]
    debug: bool,
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

    let project = ProjectRef::new(args.project_path);
    let workflow = ImportWorkflow::new(&client).with_policy(config.poll_policy());

    match workflow.run(&project, &args.filepath).await {
        Ok(()) => {
            println!("Import success for {project}");
            Ok(())
        }
        Err(e) => {
            println!("Import failed for {project}: {e}");
            std::process::exit(1);
        }
    }
}
