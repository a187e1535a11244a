//! chanwatch - keeps an LLM agent watching a chat channel
//!
//! Loads configuration and credentials, starts the MCP tool servers, then
//! runs the monitor loop until interrupted.

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Parser;
use console::style;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use chanwatch_core::config::{Config, ConfigManager};
use chanwatch_core::monitor::{Monitor, TurnOutcome};

#[derive(Parser)]
#[command(name = "chanwatch")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "LLM agent that monitors and answers a chat channel", long_about = None)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Channel to watch, overrides monitor.channel_id
    #[arg(long)]
    channel: Option<String>,

    /// Seconds between checks, overrides monitor.interval_secs
    #[arg(long)]
    interval: Option<u64>,

    /// Run a single check and exit
    #[arg(long)]
    once: bool,

    /// Validate configuration and credentials, then exit
    #[arg(long, conflicts_with = "once")]
    check: bool,

    /// Write the default configuration file and exit
    #[arg(long, conflicts_with_all = ["once", "check"])]
    init: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Variables already in the environment win over .env
    let dotenv = dotenvy::dotenv();

    let default_filter = if cli.verbose {
        "info,chanwatch_core=debug,chanwatch_mcp=debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    match dotenv {
        Ok(path) => debug!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => warn!(error = %e, "failed to load .env"),
    }

    let manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    }
    .context("failed to load configuration")?;

    if cli.init {
        if manager.path().exists() {
            bail!("config file already exists: {}", manager.path().display());
        }
        manager.save().context("failed to write configuration")?;
        println!(
            "{} {}",
            style("Wrote default configuration to").green(),
            style(manager.path().display()).cyan()
        );
        return Ok(());
    }

    let config_path = manager.path().to_path_buf();
    let mut config = manager.into_config();
    if let Some(channel) = cli.channel {
        config.monitor.channel_id = Some(channel);
    }
    if let Some(interval) = cli.interval {
        config.monitor.interval_secs = interval;
    }

    if cli.check {
        return check_config(&config, &config_path);
    }

    let mut monitor = Monitor::initialize(&config)
        .await
        .context("startup failed")?;

    let cancel = monitor.cancellation_token();
    tokio::spawn(async move {
        wait_for_shutdown().await;
        info!("stopping monitoring, the current check will finish first");
        cancel.cancel();
    });

    let result = if cli.once {
        monitor.run_once().await.map(|report| {
            if let TurnOutcome::Failed { error } = &report.outcome {
                warn!(error = %error, "check failed");
            }
        })
    } else {
        info!("press Ctrl+C to stop");
        monitor.run().await.map(|_| ())
    };

    monitor.shutdown().await;
    result.context("monitor stopped unexpectedly")?;
    info!("shutdown complete");
    Ok(())
}

/// Print the effective configuration and validate it against the environment
fn check_config(config: &Config, path: &std::path::Path) -> anyhow::Result<()> {
    println!("{}", style("Configuration:").bold());
    println!("  File: {}", style(path.display()).green());
    println!(
        "  Provider: {} ({})",
        style(&config.agent.provider).cyan(),
        config.agent.model_name().unwrap_or_else(|_| "unknown".to_string())
    );
    println!(
        "  Channel: {}",
        match config.monitor.channel_id() {
            Ok(channel) => style(channel).cyan(),
            Err(_) => style("not set".to_string()).red(),
        }
    );
    println!("  Interval: {}s", config.monitor.interval_secs);

    println!("{}", style("Tool servers:").bold());
    for (name, server) in config.enabled_servers() {
        println!(
            "  {} {} {} {}",
            style("•").cyan(),
            style(name).bold(),
            server.command,
            style(server.args.join(" ")).dim()
        );
        let credentials = server.required_credentials();
        if !credentials.is_empty() {
            println!("    Credentials: {}", style(credentials.join(", ")).dim());
        }
    }

    match config.validate() {
        Ok(()) => {
            println!("{}", style("✓ Configuration OK").green());
            Ok(())
        }
        Err(e) => {
            println!("{}", style(format!("✗ {}", e)).red());
            bail!("configuration check failed")
        }
    }
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "SIGTERM handler unavailable, listening for Ctrl+C only");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}
