//! SolarSage command-line entry point
//!
//! Loads configuration, opens the Decision Store, resolves any runs left
//! without an execution result, then runs one command and prints its result
//! as JSON on stdout. Logs go to stderr.

mod cli;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use solarsage_core::{
    ConfigError, PanelId, PanelIdError, PipelineError, SolarSageConfig, SolarSageError,
    StorageError,
};
use solarsage_engine::{BrightnessClassifier, Classifier, DirectoryFrameSource, SimulatedClassifier};
use solarsage_pipeline::telemetry::{init_tracing, TelemetryError};
use solarsage_pipeline::{Orchestrator, Scheduler, TriggerRequest};
use solarsage_storage::open_store;
use tokio::sync::watch;

use crate::cli::{Cli, Command};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    SolarSage(#[from] SolarSageError),

    #[error(transparent)]
    PanelId(#[from] PanelIdError),

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    #[error("Failed to write output: {0}")]
    Output(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    init_tracing()?;

    let config = SolarSageConfig::load(cli.config.as_deref())?;
    let store = open_store(&config.store)?;
    let classifier = build_classifier(&cli, &config);
    tracing::info!(
        panels = config.panels.len(),
        backend = store.backend_name(),
        classifier = classifier.name(),
        "SolarSage starting"
    );

    let orchestrator = Arc::new(Orchestrator::new(&config, classifier, store));
    let report = orchestrator.reconcile().await?;
    if report.pending > 0 {
        tracing::warn!(
            pending = report.pending,
            resolved = report.resolved,
            "resolved runs left without an execution result"
        );
    }

    match cli.command {
        Command::Trigger { panel_id, location } => {
            let mut request = TriggerRequest::new(PanelId::new(panel_id)?);
            if let Some(location) = location {
                request = request.with_location(location);
            }
            print_json(&orchestrator.trigger(request).await?)
        }
        Command::Latest { panel_id } => {
            let panel_id = panel_id.map(PanelId::new).transpose()?;
            print_json(&orchestrator.latest_decision(panel_id.as_ref()).await?)
        }
        Command::Panels => print_json(&orchestrator.list_panels().await?),
        Command::History { panel_id, limit } => {
            let panel_id = PanelId::new(panel_id)?;
            print_json(&orchestrator.history(&panel_id, limit).await?)
        }
        Command::Stats => print_json(&orchestrator.stats().await?),
        Command::Logs { limit } => print_json(&orchestrator.logs(limit).await?),
        Command::Health => print_json(&orchestrator.health().await),
        Command::Schedule { interval_secs } => {
            let interval = interval_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.schedule_interval());
            let scheduler = Scheduler::new(Arc::clone(&orchestrator), interval)?;
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Shutdown signal received");
                }
                let _ = shutdown_tx.send(true);
            });
            print_json(&scheduler.run(shutdown_rx).await)
        }
    }
}

fn build_classifier(cli: &Cli, config: &SolarSageConfig) -> Arc<dyn Classifier> {
    match (&cli.frames, config.simulation.seed) {
        (Some(dir), _) => Arc::new(BrightnessClassifier::new(DirectoryFrameSource::new(dir))),
        (None, Some(seed)) => Arc::new(SimulatedClassifier::seeded(seed)),
        (None, None) => Arc::new(SimulatedClassifier::new()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
