//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// SolarSage panel maintenance pipeline
#[derive(Debug, Parser)]
#[command(name = "solarsage", version)]
#[command(about = "Classify, forecast, decide and act on dusty solar panels", long_about = None)]
#[command(disable_help_subcommand = true)]
pub struct Cli {
    /// Configuration file (TOML). Without one the built-in four-panel roster is used.
    #[arg(long, global = true, env = "SOLARSAGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Classify from raw 8-bit grayscale frames (`<dir>/<panel_id>.gray`)
    /// instead of simulated readings
    #[arg(long, global = true)]
    pub frames: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the pipeline once for a panel
    Trigger {
        panel_id: String,
        /// Override the panel's configured location
        #[arg(long)]
        location: Option<String>,
    },

    /// Most recent complete run, for one panel or any
    Latest { panel_id: Option<String> },

    /// Derived state of every roster panel
    Panels,

    /// Runs for a panel, most recent first
    History {
        panel_id: String,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Aggregate statistics
    Stats,

    /// System log, most recent first
    Logs {
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Component health
    Health,

    /// Sweep the roster on the configured interval until Ctrl-C
    Schedule {
        /// Override `schedule_interval_secs`
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        interval_secs: Option<u64>,
    },
}
