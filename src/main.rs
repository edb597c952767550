//! browser-launcher-host
//!
//! Native messaging host binary. Stdout carries the framed protocol to the
//! browser, so all logging goes to stderr or to the configured log file.
//! Shutdown signals terminate immediately without draining in-flight work.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use browser_launcher_host::{config::Config, dispatch::Dispatcher, runner::ShellRunner, server};

#[derive(Parser, Debug)]
#[command(name = "browser-launcher-host")]
#[command(about = "Native messaging host for the browser launcher extension")]
struct Args {
    /// Path to the JSON configuration file
    #[arg(long, default_value = "host-config.json")]
    config: PathBuf,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

/// Move an oversized log file aside once at startup. Rotation proper is the
/// installer's concern; this only keeps an unattended host from growing a
/// single file without bound.
fn roll_log_file(path: &std::path::Path, max_size: u64) {
    let Ok(metadata) = std::fs::metadata(path) else {
        return;
    };
    if metadata.len() > max_size {
        let mut rolled = path.as_os_str().to_owned();
        rolled.push(".old");
        let _ = std::fs::rename(path, PathBuf::from(rolled));
    }
}

fn init_logging(config: &Config, override_level: Option<&str>) -> Result<()> {
    let level = override_level.unwrap_or(&config.logging.level);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if let Some(file) = &config.logging.file {
        roll_log_file(file, config.logging.max_size_bytes);
        let log_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(file)
            .with_context(|| format!("Failed to open log file: {}", file.display()))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(Arc::new(log_file))
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

/// Resolves when an interrupt or terminate signal arrives.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config).context("Failed to load configuration")?;
    init_logging(&config, args.log_level.as_deref())?;

    let dispatcher = Dispatcher::new(Arc::new(config), Arc::new(ShellRunner::new()));

    // Signals win the race: the host exits immediately without draining
    // in-flight work, matching the extension's expectations.
    tokio::select! {
        result = server::serve_stdio(&dispatcher) => result?,
        () = shutdown_signal() => {
            info!("shutdown signal received, exiting");
        }
    }

    Ok(())
}
