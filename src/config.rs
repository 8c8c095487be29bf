//! Configuration loading and validation.
//!
//! Loads `sidecar.toml` with per-section defaults. All sections use
//! `#[serde(default)]` so a minimal or empty config file is valid and
//! reproduces the stock sidecar: vsock transport, a three-candidate
//! exchange against one baseline, and a 1 KiB / 5 s relay.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use uuid::Uuid;

use crate::policy::{MountPolicy, PolicySet};
use crate::session::Exchange;
use crate::transport::{ServiceAddress, HV_GUID_LOOPBACK, HV_GUID_PARENT};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "GCS_SIDECAR_CONFIG";

/// Config file used when neither `--config` nor [`CONFIG_ENV`] is set.
pub const DEFAULT_CONFIG_FILE: &str = "sidecar.toml";

/// Largest accepted relay chunk.
const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Top-level sidecar configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SidecarConfig {
    /// Socket family used for both channels.
    pub transport: TransportConfig,

    /// Lifecycle log location and level.
    pub logging: LoggingConfig,

    /// Validation channel: address, dial policy, exchange and baselines.
    pub validation: ValidationConfig,

    /// Relay channel: address, chunking and sink.
    pub relay: RelayConfig,
}

/// Which transport to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Linux `AF_VSOCK`.
    #[default]
    Vsock,
    /// Unix-domain sockets under `socket_dir`.
    Unix,
}

/// Transport selection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Socket family.
    pub kind: TransportKind,

    /// Directory for socket files when `kind = "unix"`.
    pub socket_dir: PathBuf,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::default(),
            socket_dir: PathBuf::from("/run/gcs-sidecar"),
        }
    }
}

/// Lifecycle log settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory holding the log file.
    pub dir: PathBuf,

    /// Log file name inside `dir`.
    pub file_name: String,

    /// Default level filter; `RUST_LOG` takes precedence.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            file_name: "sidecar.log".to_owned(),
            level: "info".to_owned(),
        }
    }
}

/// How the candidate count is agreed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeMode {
    /// `candidates` frames, no header.
    #[default]
    Fixed,
    /// The host sends the count first, bounded by `max_candidates`.
    Declared,
}

/// Validation channel settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Context identifier dialed (the host by default).
    pub context_id: Uuid,

    /// Service identifier dialed.
    pub service_id: Uuid,

    /// Dial retry policy.
    pub dial: DialConfig,

    /// Fixed or declared candidate count.
    pub exchange: ExchangeMode,

    /// Candidate count for a fixed exchange.
    pub candidates: u32,

    /// Upper bound for a declared exchange.
    pub max_candidates: u32,

    /// Largest accepted frame, newline included.
    pub max_frame_bytes: usize,

    /// Baseline records; a candidate is allowed if it matches any of them.
    #[serde(rename = "baseline")]
    pub baselines: Vec<MountPolicy>,
}

impl ValidationConfig {
    /// Address of the validation channel.
    pub fn address(&self) -> ServiceAddress {
        ServiceAddress::new(self.context_id, self.service_id)
    }

    /// Exchange agreement for the session.
    pub fn exchange(&self) -> Exchange {
        match self.exchange {
            ExchangeMode::Fixed => Exchange::Fixed(self.candidates),
            ExchangeMode::Declared => Exchange::Declared {
                max: self.max_candidates,
            },
        }
    }

    /// Baselines as a policy set.
    pub fn policy_set(&self) -> PolicySet {
        PolicySet::new(self.baselines.clone())
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            context_id: HV_GUID_PARENT,
            service_id: default_validation_service(),
            dial: DialConfig::default(),
            exchange: ExchangeMode::default(),
            candidates: 3,
            max_candidates: 64,
            max_frame_bytes: crate::wire::DEFAULT_MAX_FRAME_BYTES,
            baselines: vec![default_baseline()],
        }
    }
}

/// Dial retry policy for the validation channel.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DialConfig {
    /// Seconds from task start until dialing gives up.
    pub deadline_secs: u64,

    /// Total attempt budget.
    pub max_retries: u32,

    /// Milliseconds between attempts.
    pub retry_delay_ms: u64,
}

impl DialConfig {
    /// Deadline window as a duration.
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    /// Pause between attempts.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for DialConfig {
    fn default() -> Self {
        Self {
            deadline_secs: 600,
            max_retries: 1000,
            retry_delay_ms: 1000,
        }
    }
}

/// Relay channel settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Context identifier listened on.
    pub context_id: Uuid,

    /// Service identifier listened on.
    pub service_id: Uuid,

    /// Bytes requested per read.
    pub chunk_size: usize,

    /// Milliseconds to pause after each append.
    pub interval_ms: u64,

    /// File receiving the relayed bytes (created, appended).
    pub sink_path: PathBuf,
}

impl RelayConfig {
    /// Address of the relay channel.
    pub fn address(&self) -> ServiceAddress {
        ServiceAddress::new(self.context_id, self.service_id)
    }

    /// Pause after each append.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            context_id: HV_GUID_LOOPBACK,
            service_id: default_relay_service(),
            chunk_size: 1024,
            interval_ms: 5000,
            sink_path: PathBuf::from("gcsLog.txt"),
        }
    }
}

impl SidecarConfig {
    /// Validate that configuration values are within sane bounds.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.validation.baselines.is_empty(),
            "validation.baseline must list at least one record"
        );
        anyhow::ensure!(
            self.validation.max_candidates >= 1,
            "validation.max_candidates must be >= 1"
        );
        anyhow::ensure!(
            self.validation.candidates <= self.validation.max_candidates,
            "validation.candidates must be <= validation.max_candidates"
        );
        anyhow::ensure!(
            self.validation.max_frame_bytes >= 256,
            "validation.max_frame_bytes must be >= 256"
        );
        anyhow::ensure!(
            self.validation.dial.deadline_secs >= 1,
            "validation.dial.deadline_secs must be >= 1"
        );
        anyhow::ensure!(
            (1..=MAX_CHUNK_SIZE).contains(&self.relay.chunk_size),
            "relay.chunk_size must be in [1, {MAX_CHUNK_SIZE}]"
        );
        anyhow::ensure!(
            !self.relay.sink_path.as_os_str().is_empty(),
            "relay.sink_path must not be empty"
        );
        anyhow::ensure!(
            !self.logging.file_name.is_empty(),
            "logging.file_name must not be empty"
        );
        if self.transport.kind == TransportKind::Unix {
            anyhow::ensure!(
                !self.transport.socket_dir.as_os_str().is_empty(),
                "transport.socket_dir is required for the unix transport"
            );
        }
        Ok(())
    }

    /// Parse a TOML string and validate it.
    pub fn from_toml(toml_str: &str) -> anyhow::Result<Self> {
        let config: SidecarConfig =
            toml::from_str(toml_str).context("failed to parse sidecar config TOML")?;
        config.validate()?;
        Ok(config)
    }
}

/// Load sidecar configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed, or fails validation.
pub fn load_sidecar_config(path: &Path) -> anyhow::Result<SidecarConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read sidecar config at {}", path.display()))?;
    let config: SidecarConfig = toml::from_str(&contents)
        .with_context(|| format!("failed to parse sidecar config at {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

/// Resolve and load the config.
///
/// Precedence: `explicit` path, then [`CONFIG_ENV`], then
/// [`DEFAULT_CONFIG_FILE`] in the working directory. Only a missing default
/// file falls back to built-in defaults; a missing explicit file is an error.
///
/// # Errors
///
/// Returns an error if a named file cannot be loaded or validation fails.
pub fn resolve_config(
    explicit: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<(SidecarConfig, Option<PathBuf>)> {
    if let Some(path) = explicit {
        return Ok((load_sidecar_config(path)?, Some(path.to_path_buf())));
    }
    if let Some(path) = env(CONFIG_ENV) {
        let path = PathBuf::from(path);
        return Ok((load_sidecar_config(&path)?, Some(path)));
    }

    let path = PathBuf::from(DEFAULT_CONFIG_FILE);
    if path.exists() {
        return Ok((load_sidecar_config(&path)?, Some(path)));
    }
    let config = SidecarConfig::default();
    config.validate()?;
    Ok((config, None))
}

/// The stock baseline: a physical disk mounted from `C:\src\mount\path` at
/// `C:\dest\mount\path`.
pub fn default_baseline() -> MountPolicy {
    MountPolicy::new(
        r"C:\dest\mount\path",
        "physical-disk",
        r"C:\src\mount\path",
    )
}

fn default_validation_service() -> Uuid {
    Uuid::from_u128(0x0000_5001_facb_11e6_bd58_6400_6a79_86d3)
}

fn default_relay_service() -> Uuid {
    Uuid::from_u128(0x0000_5002_facb_11e6_bd58_6400_6a79_86d3)
}
