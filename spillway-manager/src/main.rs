//! Spillway Manager
//!
//! Provisions and tears down per-configuration processing pipelines in
//! response to configuration changes.
//!
//! Architecture:
//! - Configuration: settings loaded from the environment
//! - Context: request id, cancellation and deadline of one unit of work
//! - Middleware: logging and panic containment around the handler
//! - Services: add / update / delete orchestration and batch queue setup
//! - Scheduler: periodic queue sweep over every known configuration
//! - Intake: change events read line by line and handed to the manager
//!
//! The collaborator services are in-memory; they share one call journal.

mod config;
mod context;
mod error;
mod intake;
mod middleware;
mod scheduler;
mod service;

use anyhow::{Context as AnyhowContext, Result};
use clap::{Parser, Subcommand, ValueEnum};
use spillway_core::InstructionBuilder;
use spillway_services::{
    InMemoryComputeService, InMemoryIdentifierStore, InMemoryQueueService, Simulation,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::context::Context;
use crate::intake::ChangeIntake;
use crate::middleware::{catch_panic, log};
use crate::scheduler::QueueSweeper;
use crate::service::{Collaborators, PipelineManager, QueueInitializer};

/// State polls a new in-memory consumer spends in `Pending`
const LOCAL_ACTIVATION_POLLS: u32 = 1;

#[derive(Parser)]
#[command(name = "spillway-manager")]
#[command(about = "Provision pipelines from configuration changes", long_about = None)]
struct Cli {
    /// Log record format
    #[arg(
        long,
        env = "LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Text,
        global = true
    )]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Read change events from stdin and sweep queues until Ctrl-C
    Serve {
        /// Skip the periodic queue sweep
        #[arg(long)]
        no_sweep: bool,
    },
    /// Apply a file of change events, one JSON document per line
    Apply {
        /// Path to the change events
        file: PathBuf,
    },
    /// Run one batch queue setup over every known configuration
    Sweep,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_format);

    let config = load_config()?;
    info!(
        "Loaded configuration: env_name={}, identifiers_table={}",
        config.env_name, config.identifiers_table
    );

    let shutdown = CancellationToken::new();
    spawn_ctrl_c_handler(shutdown.clone());

    let simulation = Simulation::new();
    let queues = Arc::new(InMemoryQueueService::new(simulation.clone()));
    let collaborators = Collaborators {
        queues: queues.clone(),
        compute: Arc::new(
            InMemoryComputeService::new(simulation.clone())
                .with_activation_polls(LOCAL_ACTIVATION_POLLS),
        ),
        identifiers: Arc::new(InMemoryIdentifierStore::new(simulation.clone())),
    };

    info!("Services initialized");

    match cli.command {
        Commands::Serve { no_sweep } => {
            let intake = build_intake(&config, collaborators);
            let sweeper = (!no_sweep).then(|| build_sweeper(&config, queues));
            serve(intake, sweeper, shutdown).await
        }
        Commands::Apply { file } => {
            let intake = build_intake(&config, collaborators);
            apply(&intake, &file, shutdown).await
        }
        Commands::Sweep => {
            let sweeper = build_sweeper(&config, queues);
            sweep(&sweeper, &config, shutdown).await
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "spillway_manager=info".into());

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

/// Loads and validates configuration from environment variables
fn load_config() -> Result<Config> {
    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn spawn_ctrl_c_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received, shutting down"),
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
        shutdown.cancel();
    });
}

fn build_intake(config: &Config, collaborators: Collaborators) -> ChangeIntake {
    let manager = PipelineManager::new(collaborators, config.manager_settings())
        .use_middleware(&[catch_panic(), log()]);
    info!(
        "Pipeline manager ready (env: {}, readiness: {} x {:?})",
        manager.settings().env_name,
        manager.settings().readiness_attempts,
        manager.settings().readiness_interval
    );

    ChangeIntake::new(
        InstructionBuilder::new(config.constants()),
        Arc::new(manager),
        config.request_timeout,
    )
}

fn build_sweeper(config: &Config, queues: Arc<InMemoryQueueService>) -> QueueSweeper {
    QueueSweeper::new(
        config.sweep_interval,
        config.request_timeout,
        Arc::new(config.config_source()),
        QueueInitializer::new(queues),
    )
}

async fn serve(
    intake: ChangeIntake,
    sweeper: Option<QueueSweeper>,
    shutdown: CancellationToken,
) -> Result<()> {
    let sweep_handle = sweeper.map(|sweeper| {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { sweeper.run(shutdown).await })
    });

    let summary = intake
        .run(BufReader::new(tokio::io::stdin()), shutdown.clone())
        .await?;
    info!(
        "Change intake stopped ({} event(s), {} failed)",
        summary.events, summary.failed
    );

    if let Some(handle) = sweep_handle {
        handle.await.context("Queue sweeper task failed")?;
    }

    Ok(())
}

async fn apply(intake: &ChangeIntake, file: &Path, shutdown: CancellationToken) -> Result<()> {
    let events = tokio::fs::File::open(file)
        .await
        .with_context(|| format!("Failed to open {}", file.display()))?;

    let summary = intake.run(BufReader::new(events), shutdown).await?;
    if summary.failed > 0 {
        anyhow::bail!(
            "{} of {} change event(s) failed",
            summary.failed,
            summary.events
        );
    }

    info!("Applied {} change event(s)", summary.events);
    Ok(())
}

async fn sweep(sweeper: &QueueSweeper, config: &Config, shutdown: CancellationToken) -> Result<()> {
    let ctx = Context::new(shutdown).with_timeout(config.request_timeout);
    let report = sweeper.sweep_once(&ctx).await?;

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to encode sweep report")?
    );

    if !report.is_success() {
        anyhow::bail!(
            "queue setup failed for {} of {} configuration(s)",
            report.failed.len(),
            report.attempted
        );
    }
    Ok(())
}
