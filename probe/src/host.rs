//! Host ends of the validation and relay channels.

use gcs_sidecar::policy::MountPolicy;
use gcs_sidecar::session::ExchangeHeader;
use gcs_sidecar::wire::{FrameReader, FrameWriter, WireError};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Errors from driving a sidecar channel.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// A frame could not be sent or received.
    #[error("candidate #{index}: {source}")]
    Exchange {
        /// Zero-based candidate position.
        index: usize,
        /// Wire failure.
        #[source]
        source: WireError,
    },

    /// The header frame could not be sent.
    #[error("failed to send exchange header: {0}")]
    Header(#[source] WireError),

    /// More candidates than a header can announce.
    #[error("{0} candidates do not fit in an exchange header")]
    TooManyCandidates(usize),

    /// Streaming the relay payload failed.
    #[error("relay stream failed: {0}")]
    Relay(#[from] std::io::Error),
}

/// Send each candidate and wait for its verdict before sending the next.
///
/// With `declare`, an [`ExchangeHeader`] announcing the count goes first.
///
/// # Errors
///
/// Fails on the first frame that cannot be written or read.
pub async fn serve_candidates<S>(
    stream: S,
    candidates: &[MountPolicy],
    declare: bool,
    max_frame_bytes: usize,
) -> Result<Vec<bool>, ProbeError>
where
    S: AsyncRead + AsyncWrite,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let mut reader = FrameReader::new(read_half, max_frame_bytes);
    let mut writer = FrameWriter::new(write_half);

    if declare {
        let count = u32::try_from(candidates.len())
            .map_err(|_| ProbeError::TooManyCandidates(candidates.len()))?;
        writer
            .write_frame(&ExchangeHeader { candidates: count })
            .await
            .map_err(ProbeError::Header)?;
    }

    let mut verdicts = Vec::with_capacity(candidates.len());
    for (index, candidate) in candidates.iter().enumerate() {
        writer
            .write_frame(candidate)
            .await
            .map_err(|source| ProbeError::Exchange { index, source })?;
        let verdict: bool = reader
            .read_frame()
            .await
            .map_err(|source| ProbeError::Exchange { index, source })?;
        debug!(index, verdict, "verdict received");
        verdicts.push(verdict);
    }
    Ok(verdicts)
}

/// Copy `payload` into the relay channel, then close the write direction so
/// the sidecar sees end-of-stream.
///
/// # Errors
///
/// Returns the first read, write or shutdown error.
pub async fn stream_payload<S, R>(stream: &mut S, payload: &mut R) -> Result<u64, ProbeError>
where
    S: AsyncWrite + Unpin + ?Sized,
    R: AsyncRead + Unpin + ?Sized,
{
    let sent = tokio::io::copy(payload, stream).await?;
    stream.shutdown().await?;
    Ok(sent)
}
