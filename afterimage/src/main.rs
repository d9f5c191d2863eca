//! Afterimage - sensor-driven degrading image installation
//!
//! CLI entry point for running the installation and inspecting its config.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{debug, info, warn};

use afterimage::cli::{Cli, Command, get_log_path};
use afterimage::config::Config;
use afterimage::display::{HeadlessSurface, SnapshotSurface, Surface};
use afterimage::hardware::HardwareSet;
use afterimage::orchestrator::{Orchestrator, OrchestratorSettings, ServiceSet};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    let log_dir = log_path.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    // Setup logging with priority: CLI > config > INFO default
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    info!("Afterimage loaded config: profile={}", config.profile);

    // Dispatch command
    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Some(Command::Run { profile, duration_secs }) => {
            debug!(?profile, ?duration_secs, "main: matched Run command");
            cmd_run(config, profile, duration_secs).await
        }
        Some(Command::Profiles) => {
            debug!("main: matched Profiles command");
            cmd_profiles(&config)
        }
        Some(Command::ShowConfig) => {
            debug!("main: matched ShowConfig command");
            cmd_show_config(&config)
        }
        None => {
            debug!("main: no command specified, running installation");
            cmd_run(config, None, None).await
        }
    }
}

/// Run the installation until Ctrl-C or the requested duration
async fn cmd_run(mut config: Config, profile: Option<String>, duration_secs: Option<u64>) -> Result<()> {
    if let Some(profile) = profile {
        config.profile = profile;
    }
    config.validate().context("Invalid configuration")?;
    let profile = config.profile(&config.profile)?;
    info!(profile = %config.profile, "cmd_run: starting installation");

    let mut surface: Box<dyn Surface> = match &config.display.snapshot_dir {
        Some(dir) => Box::new(
            SnapshotSurface::new(dir, config.display.snapshot_every).context("Failed to prepare snapshot directory")?,
        ),
        None => Box::new(HeadlessSurface::new()),
    };

    let hardware = HardwareSet::simulated(config.sensors.simulation_seed);
    let set = ServiceSet::installation(&config, &profile, hardware);
    let mut orchestrator = Orchestrator::start(set, OrchestratorSettings::from_config(&config))?;

    let stop = orchestrator.stop_token();
    tokio::spawn(async move {
        match duration_secs {
            Some(secs) => {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(secs)) => info!(secs, "Run duration reached"),
                    _ = tokio::signal::ctrl_c() => info!("Ctrl-C received"),
                }
            }
            None => {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "Failed to listen for Ctrl-C");
                    return;
                }
                info!("Ctrl-C received");
            }
        }
        stop.cancel();
    });

    println!(
        "{} Running profile {} (Ctrl-C to stop, logs: {})",
        "▶".green(),
        config.profile.cyan(),
        get_log_path().display()
    );
    let render = orchestrator.run_until_stopped(surface.as_mut()).await;
    let report = orchestrator.shutdown().await;

    println!(
        "{} Stopped after {} frames",
        if report.is_clean() { "✓".green() } else { "!".yellow() },
        render.presented
    );
    for (id, stats) in &report.routers {
        println!(
            "  {:<18} forwarded {:>5}  dropped {:>4}  idle {:>4}",
            id.as_str(),
            stats.forwarded,
            stats.dropped,
            stats.timeouts
        );
    }
    for name in &report.timed_out {
        println!("  {} {} did not stop in time", "!".yellow(), name);
    }
    for (id, err) in &report.cleanup_errors {
        println!("  {} cleanup of {} failed: {}", "!".yellow(), id, err);
    }
    Ok(())
}

/// List built-in and configured profiles
fn cmd_profiles(config: &Config) -> Result<()> {
    debug!("cmd_profiles: called");
    for (name, profile) in config.all_profiles() {
        let marker = if name == config.profile { "*".green() } else { " ".normal() };
        println!("{} {}", marker, name.bold());
        println!(
            "    display step {:<6} ultrasonic threshold {} cm",
            profile.display_level_step, profile.ultrasonic_threshold
        );
        for (sensor, tuning) in [("face", &profile.face), ("ultrasonic", &profile.ultrasonic), ("touch", &profile.touch)] {
            println!(
                "    {:<11} strength {} [{}, {}] step {}  duration {}s [{}, {}] step {}",
                sensor.cyan(),
                tuning.strength,
                tuning.strength_min,
                tuning.strength_max,
                tuning.strength_step,
                tuning.duration,
                tuning.duration_min,
                tuning.duration_max,
                tuning.duration_step
            );
        }
    }
    Ok(())
}

/// Print the effective configuration
fn cmd_show_config(config: &Config) -> Result<()> {
    debug!("cmd_show_config: called");
    let yaml = serde_yaml::to_string(config).context("Failed to serialize config")?;
    print!("{}", yaml);
    Ok(())
}
