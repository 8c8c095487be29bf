//! gcs-sidecar CLI entry point.
//!
//! Provides `start` and `check` subcommands for running the sidecar or
//! validating its configuration.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use gcs_sidecar::config::{resolve_config, SidecarConfig, TransportKind};
use gcs_sidecar::logging;
use gcs_sidecar::supervisor::{Sidecar, SidecarReport};
use gcs_sidecar::transport::{Transport, UnixTransport};

/// gcs-sidecar — mount-policy validation and log relay over VM sockets.
#[derive(Parser)]
#[command(name = "gcs-sidecar", version, about)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Run the sidecar until both sessions end or a shutdown signal arrives.
    Start {
        /// Config file (defaults to $GCS_SIDECAR_CONFIG, then ./sidecar.toml).
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Load and validate the config, print the resolved endpoints, and exit.
    Check {
        /// Config file (defaults to $GCS_SIDECAR_CONFIG, then ./sidecar.toml).
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Start { config } => handle_start(config).await,
        Command::Check { config } => handle_check(config),
    }
}

/// Run the sidecar.
async fn handle_start(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, source) = resolve_config(config_path.as_deref(), |key| std::env::var(key).ok())
        .context("failed to load sidecar configuration")?;

    // Lifecycle log lives until the end of this function on every path.
    let _logging_guard = logging::init_production(
        &config.logging.dir,
        &config.logging.file_name,
        &config.logging.level,
    )?;

    info!(
        config = %source.as_ref().map_or_else(|| "<defaults>".to_owned(), |p| p.display().to_string()),
        transport = ?config.transport.kind,
        "gcs sidecar started"
    );

    let report = match config.transport.kind {
        TransportKind::Unix => {
            let transport = UnixTransport::new(&config.transport.socket_dir);
            supervise(Sidecar::new(transport, config)).await
        }
        TransportKind::Vsock => start_vsock(config).await?,
    };

    let Some(report) = report else {
        info!("gcs sidecar stopped by signal");
        return Ok(());
    };
    info!(
        validation_ok = report.validation.is_ok(),
        relay_ok = report.relay.is_ok(),
        "gcs sidecar finished"
    );

    match (report.validation, report.relay) {
        (Ok(_), Ok(_)) => Ok(()),
        (Err(e), Ok(_)) => Err(anyhow::Error::new(e).context("validation session failed")),
        (Ok(_), Err(e)) => Err(anyhow::Error::new(e).context("relay session failed")),
        (Err(validation), Err(relay)) => {
            anyhow::bail!("validation session failed: {validation}; relay session failed: {relay}")
        }
    }
}

#[cfg(target_os = "linux")]
async fn start_vsock(config: SidecarConfig) -> anyhow::Result<Option<SidecarReport>> {
    use gcs_sidecar::transport::VsockTransport;

    Ok(supervise(Sidecar::new(VsockTransport, config)).await)
}

#[cfg(not(target_os = "linux"))]
async fn start_vsock(_config: SidecarConfig) -> anyhow::Result<Option<SidecarReport>> {
    anyhow::bail!("the vsock transport is only available on Linux; set transport.kind = \"unix\"")
}

/// Wait for the sidecar to finish, or return `None` on a shutdown signal.
async fn supervise<T: Transport>(sidecar: Sidecar<T>) -> Option<SidecarReport> {
    tokio::select! {
        report = sidecar.run() => Some(report),
        () = shutdown_signal() => {
            info!("received shutdown signal");
            None
        }
    }
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

/// Validate the config and print what the sidecar would do.
fn handle_check(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    logging::init_cli();

    let (config, source) = resolve_config(config_path.as_deref(), |key| std::env::var(key).ok())
        .context("failed to load sidecar configuration")?;

    match source {
        Some(path) => println!("config: {}", path.display()),
        None => println!("config: <defaults>"),
    }
    println!("transport: {:?}", config.transport.kind);
    if config.transport.kind == TransportKind::Unix {
        println!("socket dir: {}", config.transport.socket_dir.display());
    }
    println!("validation channel: {}", config.validation.address());
    println!("exchange: {:?}", config.validation.exchange());
    for baseline in &config.validation.baselines {
        println!("baseline: {baseline}");
    }
    println!("relay channel: {}", config.relay.address());
    println!("relay sink: {}", config.relay.sink_path.display());
    println!("config OK");
    Ok(())
}
