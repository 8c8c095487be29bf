//! Mount-policy validation over the dialed channel.
//!
//! The host sends candidate [`MountPolicy`] frames; for each one the sidecar
//! answers with a boolean verdict frame. Round trips are strictly
//! sequential: the next candidate is not read until the previous verdict has
//! been written and flushed. Any decode or encode failure ends the session.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tracing::{info, warn};

use crate::policy::{Evaluation, MountPolicy, PolicySet};
use crate::wire::{FrameReader, FrameWriter, WireError};

/// How many candidates the session expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exchange {
    /// Exactly this many candidates, agreed out of band.
    Fixed(u32),
    /// The host announces the count in an [`ExchangeHeader`] frame first.
    Declared {
        /// Largest count the sidecar accepts.
        max: u32,
    },
}

impl Default for Exchange {
    fn default() -> Self {
        Self::Fixed(3)
    }
}

/// First frame of a declared exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeHeader {
    /// Number of candidate frames that follow.
    pub candidates: u32,
}

/// Verdicts produced by a completed session, in candidate order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// One verdict per candidate.
    pub verdicts: Vec<bool>,
}

/// Errors that end a validation session.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The exchange header could not be read.
    #[error("failed to read exchange header: {0}")]
    Header(#[source] WireError),

    /// The host declared more candidates than allowed.
    #[error("host declared {declared} candidates, limit is {limit}")]
    TooManyCandidates {
        /// Count announced by the host.
        declared: u32,
        /// Configured limit.
        limit: u32,
    },

    /// A candidate could not be decoded.
    #[error("failed to decode mount policy #{index}: {source}")]
    Decode {
        /// Zero-based candidate position.
        index: u32,
        /// Wire failure.
        #[source]
        source: WireError,
    },

    /// A verdict could not be written.
    #[error("failed to encode verdict #{index}: {source}")]
    Encode {
        /// Zero-based candidate position.
        index: u32,
        /// Wire failure.
        #[source]
        source: WireError,
    },
}

/// Candidate/verdict exchange bound to one bidirectional channel.
pub struct ValidationSession<S> {
    reader: FrameReader<ReadHalf<S>>,
    writer: FrameWriter<WriteHalf<S>>,
    exchange: Exchange,
}

impl<S: AsyncRead + AsyncWrite> ValidationSession<S> {
    /// Wrap an open channel.
    pub fn new(stream: S, exchange: Exchange, max_frame_bytes: usize) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: FrameReader::new(read_half, max_frame_bytes),
            writer: FrameWriter::new(write_half),
            exchange,
        }
    }

    /// Run every round trip and return the verdicts.
    ///
    /// # Errors
    ///
    /// Fails fast on the first header, decode, or encode error. Verdicts
    /// already written stay written; no verdict is sent for the candidate
    /// that failed.
    pub async fn run(mut self, policies: &PolicySet) -> Result<ValidationReport, ValidationError> {
        let count = self.candidate_count().await?;
        info!(candidates = count, "validation exchange started");

        let mut verdicts = Vec::with_capacity(usize::try_from(count).unwrap_or_default());
        for index in 0..count {
            let candidate: MountPolicy = self
                .reader
                .read_frame()
                .await
                .map_err(|source| ValidationError::Decode { index, source })?;
            info!(index, policy = %candidate, "mount policy read");

            let evaluation = policies.evaluate(&candidate);
            if let Evaluation::Denied { mismatches } = &evaluation {
                for mismatch in mismatches {
                    warn!(
                        index,
                        field = %mismatch.field,
                        expected = %mismatch.expected,
                        actual = %mismatch.actual,
                        "mount policy denied"
                    );
                }
            }

            let verdict = evaluation.verdict();
            self.writer
                .write_frame(&verdict)
                .await
                .map_err(|source| ValidationError::Encode { index, source })?;
            info!(index, verdict, "verdict sent");

            verdicts.push(verdict);
        }

        Ok(ValidationReport { verdicts })
    }

    async fn candidate_count(&mut self) -> Result<u32, ValidationError> {
        match self.exchange {
            Exchange::Fixed(count) => Ok(count),
            Exchange::Declared { max } => {
                let header: ExchangeHeader = self
                    .reader
                    .read_frame()
                    .await
                    .map_err(ValidationError::Header)?;
                if header.candidates > max {
                    return Err(ValidationError::TooManyCandidates {
                        declared: header.candidates,
                        limit: max,
                    });
                }
                Ok(header.candidates)
            }
        }
    }
}
