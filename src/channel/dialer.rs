//! Outbound dial with a retry budget and an absolute deadline.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::ChannelError;
use crate::transport::{ServiceAddress, Transport};

const MAX_DIAL_WINDOW: Duration = Duration::from_secs(31_536_000);

/// Dials an address until it connects, runs out of attempts, or hits the
/// deadline, whichever comes first.
///
/// Holds no state between calls; every [`Dialer::dial`] starts fresh.
#[derive(Debug, Clone, Copy)]
pub struct Dialer {
    /// Absolute point after which no attempt starts.
    pub deadline: Instant,
    /// Total attempt budget. Zero still permits one attempt.
    pub max_retries: u32,
    /// Pause between failed attempts.
    pub retry_delay: Duration,
}

impl Dialer {
    /// Build a dialer with an absolute deadline.
    pub fn new(deadline: Instant, max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            deadline,
            max_retries,
            retry_delay,
        }
    }

    /// Build a dialer whose deadline is `timeout` from now.
    ///
    /// A `timeout` too large to represent is clamped to one year.
    pub fn with_timeout(timeout: Duration, max_retries: u32, retry_delay: Duration) -> Self {
        let now = Instant::now();
        let deadline = now
            .checked_add(timeout)
            .or_else(|| now.checked_add(MAX_DIAL_WINDOW))
            .unwrap_or(now);
        Self::new(deadline, max_retries, retry_delay)
    }

    /// Connect to `address` over `transport`.
    pub async fn dial<T: Transport + ?Sized>(
        &self,
        transport: &T,
        address: &ServiceAddress,
    ) -> Result<T::Stream, ChannelError> {
        if Instant::now() >= self.deadline {
            return Err(ChannelError::DeadlineElapsed { address: *address });
        }

        let budget = self.max_retries.max(1);
        let mut attempts: u32 = 0;
        let mut last_error: Option<std::io::Error> = None;

        loop {
            attempts = attempts.saturating_add(1);

            let error = match tokio::time::timeout_at(self.deadline, transport.dial(address)).await
            {
                Ok(Ok(stream)) => {
                    debug!(%address, attempts, "dial succeeded");
                    return Ok(stream);
                }
                Ok(Err(e)) => e,
                Err(_) => {
                    debug!(%address, attempts, "dial deadline reached during attempt");
                    return Err(ChannelError::Dial {
                        address: *address,
                        attempts,
                        source: last_error.unwrap_or_else(|| {
                            std::io::Error::new(
                                std::io::ErrorKind::TimedOut,
                                "dial deadline reached during attempt",
                            )
                        }),
                    });
                }
            };

            debug!(%address, attempts, error = %error, "dial attempt failed");

            let next_attempt = Instant::now()
                .checked_add(self.retry_delay)
                .filter(|at| *at < self.deadline);
            match next_attempt {
                Some(at) if attempts < budget => {
                    last_error = Some(error);
                    tokio::time::sleep_until(at).await;
                }
                _ => {
                    return Err(ChannelError::Dial {
                        address: *address,
                        attempts,
                        source: error,
                    })
                }
            }
        }
    }
}
