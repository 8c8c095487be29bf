//! Channel establishment: outbound dial with bounded retry, inbound
//! single-shot accept.

mod dialer;
mod listener;

pub use dialer::Dialer;
pub use listener::SingleShotListener;

use thiserror::Error;

use crate::transport::ServiceAddress;

/// Failure to establish a channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The dial deadline had already passed; no attempt was made.
    #[error("deadline elapsed before dialing {address}")]
    DeadlineElapsed {
        /// Address that was to be dialed.
        address: ServiceAddress,
    },

    /// Every permitted attempt failed, or the deadline cut retries short.
    #[error("failed to dial {address} after {attempts} attempt(s): {source}")]
    Dial {
        /// Address that was dialed.
        address: ServiceAddress,
        /// Attempts made before giving up.
        attempts: u32,
        /// Last transport error. When the deadline cuts an attempt short,
        /// this is the previous attempt's error, or `TimedOut` if the cut
        /// attempt was the first.
        #[source]
        source: std::io::Error,
    },

    /// The listening address could not be reserved.
    #[error("failed to bind {address}: {source}")]
    Bind {
        /// Address that was to be bound.
        address: ServiceAddress,
        /// Transport error.
        #[source]
        source: std::io::Error,
    },

    /// Waiting for the inbound connection failed.
    #[error("failed to accept on {address}: {source}")]
    Accept {
        /// Listening address.
        address: ServiceAddress,
        /// Transport error.
        #[source]
        source: std::io::Error,
    },

    /// The single-shot listener already handed out its connection.
    #[error("listener on {address} is closed")]
    ListenerClosed {
        /// Listening address.
        address: ServiceAddress,
    },
}
