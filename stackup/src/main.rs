//! stackup - local AWS emulator provisioning
//!
//! Starts localstack in Docker, creates the configured S3 buckets and SQS
//! queues, waits until they answer, and tears everything down on Ctrl-C.

use anyhow::Context;
use clap::{Parser, Subcommand};
use stackup_aws::{AwsBackend, AwsBackendConfig};
use stackup_core::{CancellationToken, Lifecycle, Orchestrator, StackupConfig};
use stackup_docker::DockerSupervisor;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "stackup")]
#[command(about = "Provision a local AWS emulator", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (defaults to ./stackup.toml when present)
    #[arg(short, long, global = true, env = "STACKUP_CONFIG")]
    config: Option<PathBuf>,

    /// Active profiles, replacing the configured list
    #[arg(
        long = "profile",
        global = true,
        env = "STACKUP_PROFILES",
        value_delimiter = ','
    )]
    profiles: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true, env = "STACKUP_LOG_LEVEL")]
    log_level: String,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Start and provision the emulator, then wait for Ctrl-C and tear it down
    Up,
    /// Stop and remove emulator containers
    Clean,
    /// Print the effective configuration as JSON
    ShowConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "stackup={0},stackup_core={0},stackup_aws={0},stackup_docker={0}",
                    args.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = match &args.config {
        Some(path) => StackupConfig::load_from(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => StackupConfig::load()?,
    };
    if !args.profiles.is_empty() {
        config.profiles = args.profiles.clone();
    }

    match args.command {
        Command::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Clean => clean(&config).await,
        Command::Up => up(&config).await,
    }
}

async fn build_lifecycle(config: &StackupConfig) -> Lifecycle<AwsBackend, DockerSupervisor> {
    let localstack = &config.localstack;

    let backend = AwsBackend::connect(&AwsBackendConfig::from_endpoints(
        localstack.host_name.clone(),
        &localstack.services,
    ))
    .await;
    let supervisor = DockerSupervisor::new(localstack.image.clone());

    let orchestrator = Orchestrator::new(Arc::new(backend), Arc::new(supervisor))
        .with_cleanup_filter(localstack.cleanup_filter.clone());

    Lifecycle::new(orchestrator, config.plan(), config.profiles.clone())
}

async fn up(config: &StackupConfig) -> anyhow::Result<()> {
    info!("Starting stackup...");
    info!("  Profiles: {:?}", config.profiles);
    info!("  Image: {}", config.localstack.image);
    info!(
        "  Retry: {} attempts, {}s apart",
        config.retry.max_attempts, config.retry.interval_secs
    );

    let lifecycle = build_lifecycle(config).await;

    let cancel = CancellationToken::new();
    let signal = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl-C, shutting down");
                cancel.cancel();
            }
        })
    };

    let startup = lifecycle.on_startup(&cancel).await;

    match &startup {
        Ok(Some(outcome)) => {
            println!("{}", serde_json::to_string_pretty(outcome)?);
            info!("Emulator ready, press Ctrl-C to stop");
            cancel.cancelled().await;
        }
        Ok(None) => {}
        Err(e) if e.is_cancelled() => warn!(error = %e, "Startup cancelled"),
        Err(e) => error!(error = %e, "Emulator provisioning failed"),
    }

    signal.abort();

    if let Some(report) = lifecycle.on_shutdown().await {
        for failure in &report.failures {
            warn!(error = %failure, "Cleanup incomplete");
        }
    }

    startup
        .map(|_| ())
        .context("emulator provisioning failed")
}

async fn clean(config: &StackupConfig) -> anyhow::Result<()> {
    let lifecycle = build_lifecycle(config).await;
    let report = lifecycle.orchestrator().deprovision().await;

    info!(removed = ?report.removed, "Cleanup finished");
    if !report.is_clean() {
        anyhow::bail!("{} container(s) could not be cleaned up", report.failures.len());
    }
    Ok(())
}
