//! gcs-sidecar-probe CLI entry point.
//!
//! Provides `validate` and `relay` subcommands that play the host side of
//! the sidecar's two channels, using the same config file as the sidecar so
//! both ends agree on addresses.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use gcs_sidecar::channel::{Dialer, SingleShotListener};
use gcs_sidecar::config::{resolve_config, SidecarConfig, TransportKind};
use gcs_sidecar::logging;
use gcs_sidecar::transport::{Transport, UnixTransport};
use gcs_sidecar_probe::candidates::load_candidates;
use gcs_sidecar_probe::host;

/// gcs-sidecar-probe — host-side emulator for the sidecar channels.
#[derive(Parser)]
#[command(name = "gcs-sidecar-probe", version, about)]
struct Cli {
    /// Sidecar config file (defaults to $GCS_SIDECAR_CONFIG, then ./sidecar.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Wait for the sidecar to dial in, send candidates and print verdicts.
    Validate {
        /// TOML file with `[[candidate]]` records.
        #[arg(long)]
        candidates: PathBuf,
        /// Announce the candidate count in a header frame first.
        #[arg(long)]
        declare: bool,
    },
    /// Dial the sidecar's relay channel and stream a file (or stdin) into it.
    Relay {
        /// File to stream; stdin when omitted.
        #[arg(long)]
        input: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_cli();

    let (config, _source) = resolve_config(cli.config.as_deref(), |key| std::env::var(key).ok())
        .context("failed to load sidecar configuration")?;

    match config.transport.kind {
        TransportKind::Unix => {
            let transport = UnixTransport::new(&config.transport.socket_dir);
            run(&transport, cli.command, &config).await
        }
        TransportKind::Vsock => run_vsock(cli.command, &config).await,
    }
}

#[cfg(target_os = "linux")]
async fn run_vsock(command: Command, config: &SidecarConfig) -> anyhow::Result<()> {
    use gcs_sidecar::transport::VsockTransport;

    run(&VsockTransport, command, config).await
}

#[cfg(not(target_os = "linux"))]
async fn run_vsock(_command: Command, _config: &SidecarConfig) -> anyhow::Result<()> {
    anyhow::bail!("the vsock transport is only available on Linux; set transport.kind = \"unix\"")
}

async fn run<T: Transport>(
    transport: &T,
    command: Command,
    config: &SidecarConfig,
) -> anyhow::Result<()> {
    match command {
        Command::Validate {
            candidates,
            declare,
        } => handle_validate(transport, &candidates, declare, config).await,
        Command::Relay { input } => handle_relay(transport, input.as_deref(), config).await,
    }
}

/// Serve one validation exchange and print a verdict per candidate.
async fn handle_validate<T: Transport>(
    transport: &T,
    candidates_path: &Path,
    declare: bool,
    config: &SidecarConfig,
) -> anyhow::Result<()> {
    let candidates = load_candidates(candidates_path)?;
    let address = config.validation.address();

    let mut listener = SingleShotListener::bind(transport, address).await?;
    info!(%address, candidates = candidates.len(), "waiting for sidecar");
    let stream = listener.accept_once().await?;

    let verdicts = host::serve_candidates(
        stream,
        &candidates,
        declare,
        config.validation.max_frame_bytes,
    )
    .await?;

    for (candidate, verdict) in candidates.iter().zip(&verdicts) {
        println!("{verdict}\t{candidate}");
    }
    Ok(())
}

/// Stream `input` (or stdin) into the relay channel.
async fn handle_relay<T: Transport>(
    transport: &T,
    input: Option<&Path>,
    config: &SidecarConfig,
) -> anyhow::Result<()> {
    let address = config.relay.address();
    let dial = &config.validation.dial;
    let dialer = Dialer::with_timeout(dial.deadline(), dial.max_retries, dial.retry_delay());
    let mut stream = dialer.dial(transport, &address).await?;
    info!(%address, "relay channel connected");

    let sent = match input {
        Some(path) => {
            let mut file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?;
            host::stream_payload(&mut stream, &mut file).await?
        }
        None => host::stream_payload(&mut stream, &mut tokio::io::stdin()).await?,
    };

    println!("sent {sent} bytes");
    Ok(())
}
