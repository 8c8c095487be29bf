//! Listener that accepts exactly one connection.

use tracing::debug;

use super::ChannelError;
use crate::transport::{Acceptor, ServiceAddress, Transport};

/// Bound endpoint that hands out one connection and then closes.
///
/// The relay channel carries a single host session, so the underlying
/// listener is dropped as soon as `accept_once` returns, successful or not.
pub struct SingleShotListener<L> {
    address: ServiceAddress,
    listener: Option<L>,
}

impl<L: Acceptor> SingleShotListener<L> {
    /// Reserve `address` on `transport`.
    pub async fn bind<T>(transport: &T, address: ServiceAddress) -> Result<Self, ChannelError>
    where
        T: Transport<Listener = L> + ?Sized,
    {
        let listener = transport
            .listen(&address)
            .await
            .map_err(|source| ChannelError::Bind { address, source })?;
        debug!(%address, "listener bound");
        Ok(Self {
            address,
            listener: Some(listener),
        })
    }

    /// Address this listener was bound to.
    pub fn address(&self) -> &ServiceAddress {
        &self.address
    }

    /// Whether the single connection has already been handed out (or the
    /// accept for it failed).
    pub fn is_closed(&self) -> bool {
        self.listener.is_none()
    }

    /// Wait for one peer, close the listener, and return the connection.
    pub async fn accept_once(&mut self) -> Result<L::Stream, ChannelError> {
        let mut listener = self
            .listener
            .take()
            .ok_or(ChannelError::ListenerClosed {
                address: self.address,
            })?;

        let accepted = listener.accept().await;
        drop(listener);
        debug!(address = %self.address, "listener closed");

        accepted.map_err(|source| ChannelError::Accept {
            address: self.address,
            source,
        })
    }
}
