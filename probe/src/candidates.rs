//! Candidate files.
//!
//! ```toml
//! [[candidate]]
//! destination = 'C:\dest\mount\path'
//! type = "physical-disk"
//! source = 'C:\src\mount\path'
//! ```

use std::path::Path;

use anyhow::Context;
use gcs_sidecar::policy::MountPolicy;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct CandidateFile {
    #[serde(default, rename = "candidate")]
    candidates: Vec<MountPolicy>,
}

/// Parse candidates from a TOML string, in file order.
///
/// # Errors
///
/// Returns an error if the TOML is invalid.
pub fn parse_candidates(toml_str: &str) -> anyhow::Result<Vec<MountPolicy>> {
    let file: CandidateFile =
        toml::from_str(toml_str).context("failed to parse candidate TOML")?;
    Ok(file.candidates)
}

/// Load candidates from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_candidates(path: &Path) -> anyhow::Result<Vec<MountPolicy>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read candidates at {}", path.display()))?;
    parse_candidates(&contents).with_context(|| format!("in {}", path.display()))
}
