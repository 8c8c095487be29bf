//! Unix-domain socket transport.
//!
//! Hybrid-vsock hypervisors (Firecracker, Cloud Hypervisor) expose guest
//! sockets to the host as Unix-domain sockets, and the same mapping is used
//! for local development and tests. Every address maps to one socket file
//! under a shared directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::net::{UnixListener, UnixStream};

use super::{Acceptor, ServiceAddress, Transport};

/// Transport mapping each [`ServiceAddress`] to a socket file in `socket_dir`.
#[derive(Debug, Clone)]
pub struct UnixTransport {
    socket_dir: PathBuf,
}

impl UnixTransport {
    /// Place socket files under `socket_dir`.
    pub fn new(socket_dir: impl Into<PathBuf>) -> Self {
        Self {
            socket_dir: socket_dir.into(),
        }
    }

    /// Directory holding the socket files.
    pub fn socket_dir(&self) -> &Path {
        &self.socket_dir
    }

    /// Socket path for `address`: `<context>_<service>.sock`, both in simple hex.
    pub fn socket_path(&self, address: &ServiceAddress) -> PathBuf {
        self.socket_dir.join(format!(
            "{}_{}.sock",
            address.context_id.simple(),
            address.service_id.simple()
        ))
    }
}

#[async_trait]
impl Transport for UnixTransport {
    type Stream = UnixStream;
    type Listener = UnixAcceptor;

    async fn dial(&self, address: &ServiceAddress) -> std::io::Result<UnixStream> {
        UnixStream::connect(self.socket_path(address)).await
    }

    async fn listen(&self, address: &ServiceAddress) -> std::io::Result<UnixAcceptor> {
        tokio::fs::create_dir_all(&self.socket_dir).await?;
        let path = self.socket_path(address);
        let listener = match UnixListener::bind(&path) {
            Ok(listener) => listener,
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                reclaim_stale_socket(&path, e).await?;
                UnixListener::bind(&path)?
            }
            Err(e) => return Err(e),
        };
        Ok(UnixAcceptor { listener, path })
    }
}

/// Remove a socket file left behind by a listener that never cleaned up.
///
/// A file nobody accepts on refuses connections; only then is it removed.
/// A live listener keeps its file and `in_use` is returned.
async fn reclaim_stale_socket(path: &Path, in_use: std::io::Error) -> std::io::Result<()> {
    match UnixStream::connect(path).await {
        Err(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
            tracing::debug!(path = %path.display(), "removing stale socket file");
            tokio::fs::remove_file(path).await
        }
        _ => Err(in_use),
    }
}

/// Listening Unix socket. The socket file is removed on drop, so a closed
/// listener refuses later connections with `NotFound`.
#[derive(Debug)]
pub struct UnixAcceptor {
    listener: UnixListener,
    path: PathBuf,
}

impl UnixAcceptor {
    /// Path of the bound socket file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Acceptor for UnixAcceptor {
    type Stream = UnixStream;

    async fn accept(&mut self) -> std::io::Result<UnixStream> {
        let (stream, _peer) = self.listener.accept().await?;
        Ok(stream)
    }
}

impl Drop for UnixAcceptor {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!(path = %self.path.display(), error = %e, "failed to remove socket file");
            }
        }
    }
}
