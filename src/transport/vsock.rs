//! Linux `AF_VSOCK` transport.
//!
//! Hyper-V sockets surface on Linux guests as vsock. Service GUIDs follow
//! the `XXXXXXXX-facb-11e6-bd58-64006a7986d3` template, where the first
//! 32 bits carry the vsock port. Context GUIDs map to well-known CIDs.

use async_trait::async_trait;
use tokio_vsock::{VsockAddr, VsockListener, VsockStream};
use uuid::Uuid;

use super::{Acceptor, ServiceAddress, Transport, HV_GUID_LOOPBACK, HV_GUID_PARENT, HV_GUID_WILDCARD};

/// Vsock CID for the local endpoint.
pub const VMADDR_CID_LOCAL: u32 = 1;

/// Vsock CID for the host.
pub const VMADDR_CID_HOST: u32 = 2;

/// Vsock CID wildcard used when binding.
pub const VMADDR_CID_ANY: u32 = u32::MAX;

/// Low 96 bits shared by every vsock-mapped service GUID.
const VSOCK_SERVICE_TEMPLATE: u128 = 0x0000_0000_facb_11e6_bd58_6400_6a79_86d3;

const TEMPLATE_MASK: u128 = (1u128 << 96).wrapping_sub(1);

/// Extract the vsock port from a templated service GUID.
pub fn service_port(service_id: &Uuid) -> Option<u32> {
    let raw = service_id.as_u128();
    if raw & TEMPLATE_MASK != VSOCK_SERVICE_TEMPLATE {
        return None;
    }
    u32::try_from(raw >> 96).ok()
}

/// Map a context GUID to a vsock CID.
pub fn context_cid(context_id: &Uuid) -> Option<u32> {
    match *context_id {
        id if id == HV_GUID_PARENT => Some(VMADDR_CID_HOST),
        id if id == HV_GUID_LOOPBACK => Some(VMADDR_CID_LOCAL),
        id if id == HV_GUID_WILDCARD => Some(VMADDR_CID_ANY),
        _ => None,
    }
}

fn invalid(address: &ServiceAddress, reason: &str) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        format!("cannot map {address} onto vsock: {reason}"),
    )
}

/// Transport over `AF_VSOCK`.
#[derive(Debug, Clone, Copy, Default)]
pub struct VsockTransport;

#[async_trait]
impl Transport for VsockTransport {
    type Stream = VsockStream;
    type Listener = VsockAcceptor;

    async fn dial(&self, address: &ServiceAddress) -> std::io::Result<VsockStream> {
        let cid = context_cid(&address.context_id)
            .ok_or_else(|| invalid(address, "unknown context identifier"))?;
        let port = service_port(&address.service_id)
            .ok_or_else(|| invalid(address, "service identifier is not vsock-templated"))?;
        VsockStream::connect(VsockAddr::new(cid, port)).await
    }

    async fn listen(&self, address: &ServiceAddress) -> std::io::Result<VsockAcceptor> {
        let port = service_port(&address.service_id)
            .ok_or_else(|| invalid(address, "service identifier is not vsock-templated"))?;
        let listener = VsockListener::bind(VsockAddr::new(VMADDR_CID_ANY, port))?;
        Ok(VsockAcceptor { listener })
    }
}

/// Listening vsock socket.
pub struct VsockAcceptor {
    listener: VsockListener,
}

#[async_trait]
impl Acceptor for VsockAcceptor {
    type Stream = VsockStream;

    async fn accept(&mut self) -> std::io::Result<VsockStream> {
        let (stream, peer) = self.listener.accept().await?;
        tracing::debug!(peer = ?peer, "accepted vsock connection");
        Ok(stream)
    }
}
