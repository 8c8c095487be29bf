//! gcs-sidecar-probe — plays the host side of both sidecar channels.
//!
//! - [`host::serve_candidates`] drives a validation exchange and collects
//!   the verdicts.
//! - [`host::stream_payload`] pushes bytes into the relay channel.
//! - [`candidates`] loads the candidate records from a TOML file.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod candidates;
pub mod host;
