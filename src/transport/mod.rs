//! VM-socket addressing and the transports that carry both channels.
//!
//! An endpoint is named by two 128-bit identifiers: the context (which VM, or
//! the host) and the service (which protocol instance on that peer). The
//! sidecar never depends on a concrete socket family; sessions only see
//! `AsyncRead + AsyncWrite` streams handed out by a [`Transport`].
//!
//! - [`UnixTransport`]: maps an address onto a Unix-domain socket path, for
//!   hybrid-vsock hypervisors and local testing.
//! - [`VsockTransport`]: Linux `AF_VSOCK`, mapping Hyper-V socket GUIDs onto
//!   vsock CID/port pairs.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use uuid::Uuid;

mod unix;
#[cfg(target_os = "linux")]
mod vsock;

pub use unix::{UnixAcceptor, UnixTransport};
#[cfg(target_os = "linux")]
pub use vsock::{VsockAcceptor, VsockTransport};

/// Context identifier of the parent partition (the host, seen from a guest).
pub const HV_GUID_PARENT: Uuid = Uuid::from_u128(0xa42e7cda_d03f_480c_9cc2_a4de20abb878);

/// Context identifier addressing the local partition.
pub const HV_GUID_LOOPBACK: Uuid = Uuid::from_u128(0xe0e16197_dd56_4a10_9195_5ee7a155a838);

/// Context identifier matching any partition.
pub const HV_GUID_WILDCARD: Uuid = Uuid::nil();

/// Socket endpoint: context identifier plus service identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceAddress {
    /// Which partition (VM or host) the endpoint lives on.
    pub context_id: Uuid,
    /// Which protocol instance on that partition.
    pub service_id: Uuid,
}

impl ServiceAddress {
    /// Build an address from its two identifiers.
    pub const fn new(context_id: Uuid, service_id: Uuid) -> Self {
        Self {
            context_id,
            service_id,
        }
    }
}

impl fmt::Display for ServiceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.context_id, self.service_id)
    }
}

/// A bound listening endpoint.
#[async_trait]
pub trait Acceptor: Send {
    /// Connection type handed out by [`Acceptor::accept`].
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Wait for the next inbound connection.
    async fn accept(&mut self) -> std::io::Result<Self::Stream>;
}

/// Dial and listen primitives for one socket family.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Connection type for both dialed and accepted channels.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;
    /// Listener type returned by [`Transport::listen`].
    type Listener: Acceptor<Stream = Self::Stream> + 'static;

    /// Make one connection attempt to `address`.
    async fn dial(&self, address: &ServiceAddress) -> std::io::Result<Self::Stream>;

    /// Reserve `address` for inbound connections.
    async fn listen(&self, address: &ServiceAddress) -> std::io::Result<Self::Listener>;
}
