//! gcs-sidecar — guest-side sidecar for lightweight VMs.
//!
//! Talks to the host over two independent VM-socket channels:
//! - a dialed validation channel, where candidate mount policies are judged
//!   against a local baseline and verdicts are sent back;
//! - a listened relay channel, which accepts one connection and appends its
//!   byte stream to a log sink.
//!
//! See `DESIGN.md` for the architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod logging;

pub mod channel;
pub mod policy;
pub mod session;
pub mod transport;
pub mod wire;

pub mod supervisor;
