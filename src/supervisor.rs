//! Runs the validation and relay tasks side by side.
//!
//! Each task owns its channel exclusively and shares nothing with the other
//! beyond read-only configuration. A failure (or panic) in one never aborts
//! the other; [`Sidecar::run`] waits on both join handles and reports each
//! outcome separately.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tracing::{error, info};

use crate::channel::{ChannelError, Dialer, SingleShotListener};
use crate::config::SidecarConfig;
use crate::session::{
    RelayError, RelaySession, RelaySummary, ValidationError, ValidationReport, ValidationSession,
};
use crate::transport::Transport;

/// Errors that end one of the sidecar's tasks.
#[derive(Debug, Error)]
pub enum SidecarError {
    /// Dial, bind or accept failed.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// The validation exchange failed.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The relay stopped on a read or sink error.
    #[error(transparent)]
    Relay(#[from] RelayError),

    /// The relay sink file could not be opened.
    #[error("failed to open relay sink {}: {source}", path.display())]
    Sink {
        /// Sink path.
        path: PathBuf,
        /// Filesystem error.
        #[source]
        source: std::io::Error,
    },

    /// The task panicked or was cancelled.
    #[error("session task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Outcome of both tasks.
#[derive(Debug)]
pub struct SidecarReport {
    /// Validation task result.
    pub validation: Result<ValidationReport, SidecarError>,
    /// Relay task result.
    pub relay: Result<RelaySummary, SidecarError>,
}

/// The sidecar: one transport, one config, two independent tasks.
pub struct Sidecar<T> {
    transport: Arc<T>,
    config: Arc<SidecarConfig>,
}

impl<T: Transport> Sidecar<T> {
    /// Build a sidecar over `transport`.
    pub fn new(transport: T, config: SidecarConfig) -> Self {
        Self {
            transport: Arc::new(transport),
            config: Arc::new(config),
        }
    }

    /// Spawn both tasks and wait until each has finished.
    pub async fn run(&self) -> SidecarReport {
        let validation = tokio::spawn(run_validation(
            Arc::clone(&self.transport),
            Arc::clone(&self.config),
        ));
        let relay = tokio::spawn(run_relay(
            Arc::clone(&self.transport),
            Arc::clone(&self.config),
        ));

        let (validation, relay) = tokio::join!(validation, relay);

        SidecarReport {
            validation: validation.map_err(SidecarError::from).and_then(|r| r),
            relay: relay.map_err(SidecarError::from).and_then(|r| r),
        }
    }
}

/// Dial the validation channel and run the candidate/verdict exchange.
///
/// # Errors
///
/// Returns the dial or session failure after recording it in the log.
pub async fn run_validation<T: Transport>(
    transport: Arc<T>,
    config: Arc<SidecarConfig>,
) -> Result<ValidationReport, SidecarError> {
    let settings = &config.validation;
    let address = settings.address();
    let dialer = Dialer::with_timeout(
        settings.dial.deadline(),
        settings.dial.max_retries,
        settings.dial.retry_delay(),
    );

    info!(%address, "started dialing");
    let stream = dialer
        .dial(transport.as_ref(), &address)
        .await
        .inspect_err(|e| error!(error = %e, "error dialing validation channel"))?;
    info!(%address, "connection established");

    let policies = settings.policy_set();
    let report = ValidationSession::new(stream, settings.exchange(), settings.max_frame_bytes)
        .run(&policies)
        .await
        .inspect_err(|e| error!(error = %e, "validation session aborted"))?;

    info!(verdicts = ?report.verdicts, "validation session complete");
    Ok(report)
}

/// Accept the single relay connection and copy its bytes into the sink.
///
/// # Errors
///
/// Returns the bind, accept, sink or relay failure after recording it in
/// the log.
pub async fn run_relay<T: Transport>(
    transport: Arc<T>,
    config: Arc<SidecarConfig>,
) -> Result<RelaySummary, SidecarError> {
    let settings = &config.relay;
    let address = settings.address();

    let mut listener = SingleShotListener::bind(transport.as_ref(), address)
        .await
        .inspect_err(|e| error!(error = %e, "error opening relay listener"))?;
    info!(%address, "relay listener opened");

    let stream = listener
        .accept_once()
        .await
        .inspect_err(|e| error!(error = %e, "error with relay accept"))?;
    info!(%address, "relay connection established");

    let mut sink = open_sink(&settings.sink_path)
        .await
        .inspect_err(|e| error!(error = %e, "error opening relay sink"))?;

    let summary = RelaySession::new(stream, settings.chunk_size, settings.interval())
        .run(&mut sink)
        .await
        .inspect_err(|e| error!(error = %e, "relay session ended"))?;

    info!(
        chunks = summary.chunks,
        bytes = summary.bytes,
        "relay channel closed by peer"
    );
    Ok(summary)
}

async fn open_sink(path: &Path) -> Result<File, SidecarError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|source| SidecarError::Sink {
            path: path.to_path_buf(),
            source,
        })
}
