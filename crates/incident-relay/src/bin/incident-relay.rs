//! Incident relay binary.
//!
//! Standalone HTTP service that turns alert webhooks into pull request
//! comments, plus a `preview` command for rendering a report locally.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use incident_relay::config::{Config, LogFormat};
use incident_relay::{
    server, AlertEvent, CloudLoggingClient, GitHubClient, IncidentPipeline, PipelineSettings,
};

#[derive(Parser)]
#[command(name = "incident-relay")]
#[command(about = "Relay monitoring alerts as log-evidence comments on pull requests")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the webhook server (default)
    Serve,

    /// Render the report for a saved payload without posting it
    Preview {
        /// Path to a webhook payload JSON file
        #[arg(long)]
        payload: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    init_tracing(config.log_format)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Preview { payload } => preview(config, &payload).await,
    }
}

fn init_tracing(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("incident_relay=info,tower_http=info"))?;
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Text => registry.with(fmt::layer()).init(),
    }
    Ok(())
}

fn build_pipeline(config: &Config) -> Result<IncidentPipeline> {
    let logs = CloudLoggingClient::new(config.logging_client_config())
        .context("Failed to create Cloud Logging client")?;
    let github = GitHubClient::new(
        &config.github_token,
        &config.github_api_url,
        config.http_timeout_secs,
    )
    .context("Failed to create GitHub client")?;

    Ok(IncidentPipeline::new(
        PipelineSettings::from(config),
        config.repo_mapping.clone(),
        Arc::new(logs),
        Arc::new(github),
    ))
}

async fn serve(config: Config) -> Result<()> {
    info!(
        project = %config.project_id,
        mapped_services = config.repo_mapping.len(),
        fallback = ?config.repo_mapping.fallback(),
        auth = config.credentials.is_some(),
        ack_before_publish = config.ack_before_publish,
        "Starting incident relay..."
    );
    if config.repo_mapping.is_empty() && config.repo_mapping.fallback().is_none() {
        warn!("No REPO_MAP_JSON entries and no DEFAULT_REPO; every alert will be unresolved");
    }

    let state = server::AppState {
        pipeline: Arc::new(build_pipeline(&config)?),
        credentials: config.credentials.clone(),
        ack_before_publish: config.ack_before_publish,
    };
    let app = server::build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!(%addr, "Incident relay listening");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

async fn preview(config: Config, payload: &Path) -> Result<()> {
    let body = tokio::fs::read(payload)
        .await
        .with_context(|| format!("Failed to read {}", payload.display()))?;
    let alert = AlertEvent::parse(&body).context("Payload rejected")?;

    let draft = build_pipeline(&config)?
        .draft(&alert)
        .await
        .context("Could not draft report")?;

    println!("Repository: {}\n", draft.repository);
    println!("{}", draft.text);
    Ok(())
}
