//! Tests for the single-shot listener.

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use uuid::Uuid;

use gcs_sidecar::channel::{ChannelError, SingleShotListener};
use gcs_sidecar::transport::{
    Acceptor, ServiceAddress, Transport, UnixTransport, HV_GUID_LOOPBACK,
};

fn address() -> ServiceAddress {
    ServiceAddress::new(HV_GUID_LOOPBACK, Uuid::from_u128(0x5002))
}

#[tokio::test]
async fn accepts_exactly_one_connection() {
    let dir = tempfile::tempdir().expect("tempdir");
    let transport = UnixTransport::new(dir.path());
    let mut listener = SingleShotListener::bind(&transport, address())
        .await
        .expect("bind");
    assert!(!listener.is_closed());

    let mut client = transport.dial(&address()).await.expect("dial");
    let mut server = listener.accept_once().await.expect("accept");
    assert!(listener.is_closed());

    client.write_all(b"hello").await.expect("write");
    let mut buf = [0u8; 5];
    server.read_exact(&mut buf).await.expect("read");
    assert_eq!(&buf, b"hello");

    assert!(matches!(
        listener.accept_once().await,
        Err(ChannelError::ListenerClosed { .. })
    ));
}

#[tokio::test]
async fn second_connection_is_refused_after_accept() {
    let dir = tempfile::tempdir().expect("tempdir");
    let transport = UnixTransport::new(dir.path());
    let mut listener = SingleShotListener::bind(&transport, address())
        .await
        .expect("bind");

    let _first = transport.dial(&address()).await.expect("first dial");
    let _accepted = listener.accept_once().await.expect("accept");

    assert!(transport.dial(&address()).await.is_err());
}

#[tokio::test]
async fn binding_a_reserved_address_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let transport = UnixTransport::new(dir.path());
    let _listener = SingleShotListener::bind(&transport, address())
        .await
        .expect("bind");

    let second = SingleShotListener::bind(&transport, address()).await;
    assert!(matches!(second, Err(ChannelError::Bind { .. })));
}

struct BrokenAcceptor;

#[async_trait]
impl Acceptor for BrokenAcceptor {
    type Stream = DuplexStream;

    async fn accept(&mut self) -> std::io::Result<DuplexStream> {
        Err(std::io::Error::other("accept failed"))
    }
}

struct BrokenTransport;

#[async_trait]
impl Transport for BrokenTransport {
    type Stream = DuplexStream;
    type Listener = BrokenAcceptor;

    async fn dial(&self, _address: &ServiceAddress) -> std::io::Result<DuplexStream> {
        Err(std::io::Error::other("no dial"))
    }

    async fn listen(&self, _address: &ServiceAddress) -> std::io::Result<BrokenAcceptor> {
        Ok(BrokenAcceptor)
    }
}

#[tokio::test]
async fn failed_accept_still_closes_listener() {
    let mut listener = SingleShotListener::bind(&BrokenTransport, address())
        .await
        .expect("bind");

    assert!(matches!(
        listener.accept_once().await,
        Err(ChannelError::Accept { .. })
    ));
    assert!(listener.is_closed());
    assert!(matches!(
        listener.accept_once().await,
        Err(ChannelError::ListenerClosed { .. })
    ));
}
