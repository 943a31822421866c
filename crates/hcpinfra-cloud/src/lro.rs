//! Long-running operation handles
//!
//! Every mutating resource-manager call hands back an [`Lro`]. The caller
//! decides when to drive it to completion with [`Lro::poll_until_done`],
//! which races each poll and each back-off sleep against a
//! [`CancellationToken`].

use crate::error::{CloudError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default interval between two polls when the service gives no hint.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Outcome of a single poll.
#[derive(Debug)]
pub enum PollStatus<T> {
    Done(T),
    InProgress {
        /// Delay requested by the service (`Retry-After`), if any
        retry_after: Option<Duration>,
    },
}

/// One pending operation on the provider side.
#[async_trait]
pub trait PollOperation<T>: Send {
    /// Query the operation once.
    async fn poll(&mut self) -> Result<PollStatus<T>>;

    /// Short label used in debug logs (usually the resource id).
    fn describe(&self) -> String {
        String::from("operation")
    }
}

enum LroState<T> {
    Ready(T),
    Pending(Box<dyn PollOperation<T>>),
}

/// Handle to a long-running operation.
pub struct Lro<T> {
    state: LroState<T>,
    interval: Duration,
}

impl<T: Send + 'static> Lro<T> {
    /// An operation the service completed synchronously.
    pub fn ready(value: T) -> Self {
        Self {
            state: LroState::Ready(value),
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// An operation that still has to be polled.
    pub fn pending(op: impl PollOperation<T> + 'static, interval: Duration) -> Self {
        Self {
            state: LroState::Pending(Box::new(op)),
            interval,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, LroState::Ready(_))
    }

    /// Poll until the operation reaches a terminal state.
    ///
    /// Returns [`CloudError::Cancelled`] as soon as `cancel` fires, even in
    /// the middle of an HTTP round trip or a back-off sleep.
    pub async fn poll_until_done(self, cancel: &CancellationToken) -> Result<T> {
        let mut op = match self.state {
            LroState::Ready(value) => return Ok(value),
            LroState::Pending(op) => op,
        };

        let mut attempts: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(CloudError::Cancelled);
            }

            attempts += 1;
            let status = tokio::select! {
                _ = cancel.cancelled() => return Err(CloudError::Cancelled),
                status = op.poll() => status?,
            };

            match status {
                PollStatus::Done(value) => {
                    debug!(operation = %op.describe(), attempts, "Long-running operation finished");
                    return Ok(value);
                }
                PollStatus::InProgress { retry_after } => {
                    let delay = retry_after.unwrap_or(self.interval);
                    debug!(operation = %op.describe(), attempts, delay_ms = delay.as_millis() as u64, "Operation still in progress");
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(CloudError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}

impl<T> std::fmt::Debug for Lro<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            LroState::Ready(_) => "ready",
            LroState::Pending(_) => "pending",
        };
        f.debug_struct("Lro")
            .field("state", &state)
            .field("interval", &self.interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Countdown {
        remaining: u32,
        polls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl PollOperation<&'static str> for Countdown {
        async fn poll(&mut self) -> Result<PollStatus<&'static str>> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            if self.remaining == 0 {
                return Ok(PollStatus::Done("done"));
            }
            self.remaining -= 1;
            Ok(PollStatus::InProgress { retry_after: None })
        }
    }

    struct Failing;

    #[async_trait]
    impl PollOperation<()> for Failing {
        async fn poll(&mut self) -> Result<PollStatus<()>> {
            Err(CloudError::OperationFailed {
                status: "Failed".into(),
                message: "quota exceeded".into(),
            })
        }
    }

    #[tokio::test]
    async fn test_ready_returns_immediately() {
        let lro = Lro::ready(7u32);
        assert!(lro.is_done());
        let value = lro.poll_until_done(&CancellationToken::new()).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_done() {
        let polls = Arc::new(AtomicU32::new(0));
        let lro = Lro::pending(
            Countdown {
                remaining: 3,
                polls: polls.clone(),
            },
            Duration::from_secs(5),
        );
        assert!(!lro.is_done());

        let value = lro.poll_until_done(&CancellationToken::new()).await.unwrap();
        assert_eq!(value, "done");
        assert_eq!(polls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_failure_is_surfaced() {
        let lro = Lro::pending(Failing, Duration::from_millis(1));
        let err = lro
            .poll_until_done(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::OperationFailed { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_poll() {
        let polls = Arc::new(AtomicU32::new(0));
        let lro = Lro::pending(
            Countdown {
                remaining: 1,
                polls: polls.clone(),
            },
            Duration::from_secs(5),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = lro.poll_until_done(&cancel).await.unwrap_err();
        assert!(matches!(err, CloudError::Cancelled));
        assert_eq!(polls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_backoff() {
        let lro = Lro::pending(
            Countdown {
                remaining: u32::MAX,
                polls: Arc::new(AtomicU32::new(0)),
            },
            Duration::from_secs(3600),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = tokio::time::timeout(Duration::from_secs(5), lro.poll_until_done(&cancel))
            .await
            .expect("cancellation should end polling promptly")
            .unwrap_err();
        assert!(matches!(err, CloudError::Cancelled));
    }
}
