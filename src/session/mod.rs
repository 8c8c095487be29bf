//! The two protocol sessions run over established channels.
//!
//! - [`ValidationSession`]: candidate/verdict exchange over the dialed channel.
//! - [`RelaySession`]: copies the accepted channel's bytes into a sink.

mod relay;
mod validation;

pub use relay::{RelayError, RelaySession, RelaySummary};
pub use validation::{Exchange, ExchangeHeader, ValidationError, ValidationReport, ValidationSession};
