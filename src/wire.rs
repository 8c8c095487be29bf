//! Newline-delimited JSON framing for the validation channel.
//!
//! Each frame is one compact JSON value followed by `\n`. JSON string
//! escaping guarantees the payload never contains a raw newline, so framing
//! needs no length prefix and both ends stay self-describing.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Default upper bound for a single frame, newline included.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024;

/// Errors from reading or writing frames.
#[derive(Debug, Error)]
pub enum WireError {
    /// Underlying channel I/O failed.
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the channel before sending any byte of the frame.
    #[error("channel closed by peer")]
    Closed,

    /// The peer closed the channel part-way through a frame.
    #[error("channel closed mid-frame after {received} bytes")]
    Truncated {
        /// Bytes received before EOF.
        received: usize,
    },

    /// The frame exceeded the configured limit.
    #[error("frame exceeds {limit} bytes")]
    FrameTooLarge {
        /// Configured frame limit.
        limit: usize,
    },

    /// The frame was not valid JSON for the expected type.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Encode `value` as a single frame, trailing newline included.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, WireError> {
    let mut bytes = serde_json::to_vec(value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Decode one frame. A single trailing `\n` (and `\r`) is tolerated.
pub fn decode<T: DeserializeOwned>(frame: &[u8]) -> Result<T, WireError> {
    let body = frame.strip_suffix(b"\n").unwrap_or(frame);
    let body = body.strip_suffix(b"\r").unwrap_or(body);
    Ok(serde_json::from_slice(body)?)
}

/// Reads frames from the receive half of a channel.
pub struct FrameReader<R> {
    inner: BufReader<R>,
    max_frame_bytes: usize,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap `reader`, rejecting frames longer than `max_frame_bytes`.
    pub fn new(reader: R, max_frame_bytes: usize) -> Self {
        Self {
            inner: BufReader::new(reader),
            max_frame_bytes,
            buf: Vec::new(),
        }
    }

    /// Read and decode the next frame.
    ///
    /// Blank lines between frames are skipped.
    pub async fn read_frame<T: DeserializeOwned>(&mut self) -> Result<T, WireError> {
        loop {
            self.buf.clear();
            let limit = u64::try_from(self.max_frame_bytes)
                .unwrap_or(u64::MAX)
                .saturating_add(1);
            let read = (&mut self.inner)
                .take(limit)
                .read_until(b'\n', &mut self.buf)
                .await?;

            if read == 0 {
                return Err(WireError::Closed);
            }
            if self.buf.last() != Some(&b'\n') {
                if self.buf.len() > self.max_frame_bytes {
                    return Err(WireError::FrameTooLarge {
                        limit: self.max_frame_bytes,
                    });
                }
                return Err(WireError::Truncated {
                    received: self.buf.len(),
                });
            }
            if self.buf.len() > self.max_frame_bytes {
                return Err(WireError::FrameTooLarge {
                    limit: self.max_frame_bytes,
                });
            }
            if self.buf.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            return decode(&self.buf);
        }
    }
}

/// Writes frames to the send half of a channel.
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Wrap `writer`.
    pub fn new(writer: W) -> Self {
        Self { inner: writer }
    }

    /// Encode `value`, write it and flush.
    pub async fn write_frame<T: Serialize>(&mut self, value: &T) -> Result<(), WireError> {
        let bytes = encode(value)?;
        self.inner.write_all(&bytes).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Shut down the write direction.
    pub async fn shutdown(&mut self) -> Result<(), WireError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}
