//! Tests for the bounded-retry dialer.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::DuplexStream;
use tokio::time::Instant;
use uuid::Uuid;

use gcs_sidecar::channel::{ChannelError, Dialer};
use gcs_sidecar::transport::{Acceptor, ServiceAddress, Transport, UnixTransport, HV_GUID_PARENT};

/// Refuses the first `failures` dials, then connects.
struct FlakyTransport {
    failures: u32,
    attempts: AtomicU32,
}

impl FlakyTransport {
    fn new(failures: u32) -> Self {
        Self {
            failures,
            attempts: AtomicU32::new(0),
        }
    }

    fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

struct NeverAcceptor;

#[async_trait]
impl Acceptor for NeverAcceptor {
    type Stream = DuplexStream;

    async fn accept(&mut self) -> std::io::Result<DuplexStream> {
        std::future::pending().await
    }
}

#[async_trait]
impl Transport for FlakyTransport {
    type Stream = DuplexStream;
    type Listener = NeverAcceptor;

    async fn dial(&self, _address: &ServiceAddress) -> std::io::Result<DuplexStream> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        if attempt <= self.failures {
            return Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("refused attempt {attempt}"),
            ));
        }
        let (stream, _peer) = tokio::io::duplex(64);
        Ok(stream)
    }

    async fn listen(&self, _address: &ServiceAddress) -> std::io::Result<NeverAcceptor> {
        Ok(NeverAcceptor)
    }
}

fn address() -> ServiceAddress {
    ServiceAddress::new(HV_GUID_PARENT, Uuid::from_u128(0x5001))
}

#[tokio::test(start_paused = true)]
async fn elapsed_deadline_fails_without_attempting() {
    let transport = FlakyTransport::new(0);
    let dialer = Dialer::new(Instant::now(), 10, Duration::from_secs(1));

    let result = dialer.dial(&transport, &address()).await;

    assert!(matches!(result, Err(ChannelError::DeadlineElapsed { .. })));
    assert_eq!(transport.attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn retries_until_connected() {
    let transport = FlakyTransport::new(2);
    let dialer = Dialer::with_timeout(Duration::from_secs(60), 10, Duration::from_secs(1));
    let started = Instant::now();

    let result = dialer.dial(&transport, &address()).await;

    assert!(result.is_ok());
    assert_eq!(transport.attempts(), 3);
    assert_eq!(started.elapsed(), Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn exhausted_budget_reports_last_error() {
    let transport = FlakyTransport::new(u32::MAX);
    let dialer = Dialer::with_timeout(Duration::from_secs(600), 4, Duration::from_secs(1));

    let result = dialer.dial(&transport, &address()).await;

    match result {
        Err(ChannelError::Dial {
            attempts, source, ..
        }) => {
            assert_eq!(attempts, 4);
            assert_eq!(source.kind(), std::io::ErrorKind::ConnectionRefused);
            assert_eq!(source.to_string(), "refused attempt 4");
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("dial should fail"),
    }
    assert_eq!(transport.attempts(), 4);
}

#[tokio::test(start_paused = true)]
async fn deadline_cuts_retries_short() {
    let transport = FlakyTransport::new(u32::MAX);
    let dialer = Dialer::with_timeout(Duration::from_millis(2500), 100, Duration::from_secs(1));

    let result = dialer.dial(&transport, &address()).await;

    assert!(matches!(
        result,
        Err(ChannelError::Dial { attempts: 3, .. })
    ));
    assert_eq!(transport.attempts(), 3);
}

#[tokio::test(start_paused = true)]
async fn zero_retries_still_attempts_once() {
    let transport = FlakyTransport::new(u32::MAX);
    let dialer = Dialer::with_timeout(Duration::from_secs(60), 0, Duration::from_secs(1));

    let result = dialer.dial(&transport, &address()).await;

    assert!(matches!(
        result,
        Err(ChannelError::Dial { attempts: 1, .. })
    ));
    assert_eq!(transport.attempts(), 1);
}

#[tokio::test]
async fn dials_a_bound_unix_listener() {
    let dir = tempfile::tempdir().expect("tempdir");
    let transport = UnixTransport::new(dir.path());
    let _listener = transport.listen(&address()).await.expect("listen");

    let dialer = Dialer::with_timeout(Duration::from_secs(5), 3, Duration::from_millis(10));
    assert!(dialer.dial(&transport, &address()).await.is_ok());
}

#[tokio::test]
async fn missing_unix_listener_exhausts_retries() {
    let dir = tempfile::tempdir().expect("tempdir");
    let transport = UnixTransport::new(dir.path());

    let dialer = Dialer::with_timeout(Duration::from_secs(5), 2, Duration::from_millis(10));
    let result = dialer.dial(&transport, &address()).await;
    assert!(matches!(
        result,
        Err(ChannelError::Dial { attempts: 2, .. })
    ));
}

/// Refuses the first `failures` dials, then never completes.
struct StallingTransport {
    failures: u32,
    attempts: AtomicU32,
}

#[async_trait]
impl Transport for StallingTransport {
    type Stream = DuplexStream;
    type Listener = NeverAcceptor;

    async fn dial(&self, _address: &ServiceAddress) -> std::io::Result<DuplexStream> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        if attempt <= self.failures {
            return Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("refused attempt {attempt}"),
            ));
        }
        std::future::pending().await
    }

    async fn listen(&self, _address: &ServiceAddress) -> std::io::Result<NeverAcceptor> {
        Ok(NeverAcceptor)
    }
}

#[tokio::test(start_paused = true)]
async fn deadline_mid_attempt_keeps_previous_error() {
    let transport = StallingTransport {
        failures: 1,
        attempts: AtomicU32::new(0),
    };
    let dialer = Dialer::with_timeout(Duration::from_secs(5), 10, Duration::from_secs(1));

    match dialer.dial(&transport, &address()).await {
        Err(ChannelError::Dial {
            attempts, source, ..
        }) => {
            assert_eq!(attempts, 2);
            assert_eq!(source.kind(), std::io::ErrorKind::ConnectionRefused);
            assert_eq!(source.to_string(), "refused attempt 1");
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("dial should fail"),
    }
}

#[tokio::test(start_paused = true)]
async fn stalled_first_attempt_times_out() {
    let transport = StallingTransport {
        failures: 0,
        attempts: AtomicU32::new(0),
    };
    let dialer = Dialer::with_timeout(Duration::from_secs(5), 10, Duration::from_secs(1));
    let started = Instant::now();

    match dialer.dial(&transport, &address()).await {
        Err(ChannelError::Dial {
            attempts, source, ..
        }) => {
            assert_eq!(attempts, 1);
            assert_eq!(source.kind(), std::io::ErrorKind::TimedOut);
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("dial should fail"),
    }
    assert_eq!(started.elapsed(), Duration::from_secs(5));
}
