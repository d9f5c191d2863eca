//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// Afterimage - an image that fades unless someone stays with it
#[derive(Parser)]
#[command(
    name = "afterimage",
    about = "Sensor-driven degrading image installation",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the installation (default)
    Run {
        /// Tuning profile to use instead of the configured one
        #[arg(short, long)]
        profile: Option<String>,

        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(short, long)]
        duration_secs: Option<u64>,
    },

    /// List available tuning profiles
    Profiles,

    /// Print the effective configuration as YAML
    ShowConfig,
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("afterimage")
        .join("logs")
        .join("afterimage.log");
    debug!(?path, "get_log_path: returning path");
    path
}
