//! Byte relay from the accepted channel into a sink.

use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Totals for a relay that ended because the peer closed the channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelaySummary {
    /// Chunks appended to the sink.
    pub chunks: u64,
    /// Bytes appended to the sink.
    pub bytes: u64,
}

/// Errors that end a relay session.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Reading from the channel failed.
    #[error("error reading from client after {chunks} chunk(s): {source}")]
    Read {
        /// Chunks appended before the failure.
        chunks: u64,
        /// Channel error.
        #[source]
        source: std::io::Error,
    },

    /// Appending to the sink failed.
    #[error("error writing to relay sink after {chunks} chunk(s): {source}")]
    Sink {
        /// Chunks appended before the failure.
        chunks: u64,
        /// Sink error.
        #[source]
        source: std::io::Error,
    },
}

/// Reads fixed-size chunks from a channel and appends them to a sink,
/// pausing between iterations.
pub struct RelaySession<R> {
    reader: R,
    chunk_size: usize,
    interval: Duration,
}

impl<R: AsyncRead + Unpin> RelaySession<R> {
    /// Relay from `reader` using `chunk_size`-byte reads and an `interval`
    /// pause after each append. A zero chunk size is raised to one byte.
    pub fn new(reader: R, chunk_size: usize, interval: Duration) -> Self {
        Self {
            reader,
            chunk_size: chunk_size.max(1),
            interval,
        }
    }

    /// Relay until the channel closes or fails.
    ///
    /// Only the bytes actually read are appended, and the sink is flushed
    /// after every chunk.
    ///
    /// # Errors
    ///
    /// Returns the first read or sink error; nothing is retried.
    pub async fn run<W>(mut self, sink: &mut W) -> Result<RelaySummary, RelayError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut buf = vec![0u8; self.chunk_size];
        let mut summary = RelaySummary::default();

        loop {
            let read = self
                .reader
                .read(&mut buf)
                .await
                .map_err(|source| RelayError::Read {
                    chunks: summary.chunks,
                    source,
                })?;
            if read == 0 {
                debug!(chunks = summary.chunks, bytes = summary.bytes, "relay channel closed");
                return Ok(summary);
            }

            sink.write_all(&buf[..read])
                .await
                .map_err(|source| RelayError::Sink {
                    chunks: summary.chunks,
                    source,
                })?;
            sink.flush().await.map_err(|source| RelayError::Sink {
                chunks: summary.chunks,
                source,
            })?;

            summary.chunks = summary.chunks.saturating_add(1);
            summary.bytes = summary
                .bytes
                .saturating_add(u64::try_from(read).unwrap_or(u64::MAX));

            if !self.interval.is_zero() {
                tokio::time::sleep(self.interval).await;
            }
        }
    }
}
