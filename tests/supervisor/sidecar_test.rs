//! End-to-end runs of both sidecar tasks over Unix-domain sockets.

use std::path::Path;
use std::time::Duration;

use tokio::io::AsyncWriteExt;

use gcs_sidecar::channel::Dialer;
use gcs_sidecar::config::{default_baseline, SidecarConfig};
use gcs_sidecar::policy::MountPolicy;
use gcs_sidecar::supervisor::{Sidecar, SidecarError};
use gcs_sidecar::transport::{Acceptor, Transport, UnixTransport};
use gcs_sidecar::wire::{FrameReader, FrameWriter, DEFAULT_MAX_FRAME_BYTES};

fn config_for(dir: &Path, sink: &Path, deadline_secs: u64) -> SidecarConfig {
    let toml_str = format!(
        r#"
[transport]
kind = "unix"
socket_dir = '{sockets}'

[validation.dial]
deadline_secs = {deadline_secs}
max_retries = 3
retry_delay_ms = 10

[relay]
chunk_size = 8
interval_ms = 0
sink_path = '{sink}'
"#,
        sockets = dir.display(),
        sink = sink.display(),
    );
    match SidecarConfig::from_toml(&toml_str) {
        Ok(config) => config,
        Err(err) => panic!("test config should parse: {err:#}"),
    }
}

fn candidates() -> Vec<MountPolicy> {
    let baseline = default_baseline();
    vec![
        MountPolicy {
            destination: "/elsewhere".to_owned(),
            ..baseline.clone()
        },
        MountPolicy {
            source: "/other/source".to_owned(),
            ..baseline.clone()
        },
        baseline,
    ]
}

/// Push `payload` into the relay channel once the sidecar is listening.
async fn send_relay_payload(
    transport: UnixTransport,
    config: SidecarConfig,
    payload: Vec<u8>,
) -> std::io::Result<()> {
    let dialer = Dialer::with_timeout(Duration::from_secs(5), 500, Duration::from_millis(10));
    let mut stream = dialer
        .dial(&transport, &config.relay.address())
        .await
        .expect("dial relay channel");
    stream.write_all(&payload).await?;
    stream.shutdown().await
}

#[tokio::test]
async fn both_channels_complete() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let sockets = tmp.path().join("sockets");
    let sink = tmp.path().join("gcsLog.txt");
    let config = config_for(&sockets, &sink, 10);

    let host = UnixTransport::new(&sockets);
    let mut validation_listener = host
        .listen(&config.validation.address())
        .await
        .expect("host listens for validation");

    let validation_host = tokio::spawn(async move {
        let stream = validation_listener.accept().await.expect("accept sidecar");
        let (read_half, write_half) = tokio::io::split(stream);
        let mut writer = FrameWriter::new(write_half);
        let mut reader = FrameReader::new(read_half, DEFAULT_MAX_FRAME_BYTES);
        let mut verdicts = Vec::new();
        for candidate in candidates() {
            writer.write_frame(&candidate).await.expect("send candidate");
            verdicts.push(reader.read_frame::<bool>().await.expect("read verdict"));
        }
        verdicts
    });

    let payload = b"guest log line one\nguest log line two\n".to_vec();
    let relay_host = tokio::spawn(send_relay_payload(
        UnixTransport::new(&sockets),
        config.clone(),
        payload.clone(),
    ));

    let sidecar = Sidecar::new(UnixTransport::new(&sockets), config);
    let report = tokio::time::timeout(Duration::from_secs(20), sidecar.run())
        .await
        .expect("sidecar finishes");

    assert_eq!(
        validation_host.await.expect("validation host"),
        vec![false, false, true]
    );
    relay_host
        .await
        .expect("relay host")
        .expect("payload sent");

    let validation = report.validation.expect("validation succeeds");
    assert_eq!(validation.verdicts, vec![false, false, true]);
    let relay = report.relay.expect("relay succeeds");
    assert_eq!(relay.bytes, u64::try_from(payload.len()).expect("fits"));

    let sunk = std::fs::read(&sink).expect("read sink");
    assert_eq!(sunk, payload);
}

#[tokio::test]
async fn failed_dial_leaves_relay_running() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let sockets = tmp.path().join("sockets");
    let sink = tmp.path().join("gcsLog.txt");
    let config = config_for(&sockets, &sink, 1);

    let relay_host = tokio::spawn(send_relay_payload(
        UnixTransport::new(&sockets),
        config.clone(),
        b"still relayed".to_vec(),
    ));

    let sidecar = Sidecar::new(UnixTransport::new(&sockets), config);
    let report = tokio::time::timeout(Duration::from_secs(20), sidecar.run())
        .await
        .expect("sidecar finishes");
    relay_host
        .await
        .expect("relay host")
        .expect("payload sent");

    assert!(matches!(report.validation, Err(SidecarError::Channel(_))));
    assert!(report.relay.is_ok());
    assert_eq!(
        std::fs::read_to_string(&sink).expect("read sink"),
        "still relayed"
    );
}

#[tokio::test]
async fn unopenable_sink_fails_only_the_relay() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let sockets = tmp.path().join("sockets");
    let sink = tmp.path().join("missing-dir").join("gcsLog.txt");
    let config = config_for(&sockets, &sink, 10);

    let host = UnixTransport::new(&sockets);
    let mut validation_listener = host
        .listen(&config.validation.address())
        .await
        .expect("host listens for validation");
    let validation_host = tokio::spawn(async move {
        let stream = validation_listener.accept().await.expect("accept sidecar");
        let (read_half, write_half) = tokio::io::split(stream);
        let mut writer = FrameWriter::new(write_half);
        let mut reader = FrameReader::new(read_half, DEFAULT_MAX_FRAME_BYTES);
        for candidate in candidates() {
            writer.write_frame(&candidate).await.expect("send candidate");
            reader.read_frame::<bool>().await.expect("read verdict");
        }
    });
    let relay_host = tokio::spawn(send_relay_payload(
        UnixTransport::new(&sockets),
        config.clone(),
        b"dropped".to_vec(),
    ));

    let sidecar = Sidecar::new(UnixTransport::new(&sockets), config);
    let report = tokio::time::timeout(Duration::from_secs(20), sidecar.run())
        .await
        .expect("sidecar finishes");
    validation_host.await.expect("validation host");
    // The sidecar drops the channel without reading, so the send may fail.
    let _sent = relay_host.await.expect("relay host");

    assert!(report.validation.is_ok());
    assert!(matches!(report.relay, Err(SidecarError::Sink { .. })));
    assert!(!sink.exists());
}
