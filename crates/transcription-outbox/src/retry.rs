//! Bounded delivery retries.

use crate::{BusTransport, DeliveryError, TranscriptionEvent};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// How long to wait between delivery attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// Same delay before every retry.
    Fixed { delay: Duration },
    /// `initial * factor^n` for retry `n`, capped at `max`, optionally with
    /// full jitter (uniform in `[0, base]`).
    Exponential {
        initial: Duration,
        max: Duration,
        factor: f64,
        jitter: bool,
    },
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::Fixed {
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryStrategy {
    pub fn fixed(delay: Duration) -> Self {
        Self::Fixed { delay }
    }

    /// Delay to sleep after failed attempt number `retry` (0-indexed).
    pub fn delay_for(&self, retry: u32) -> Duration {
        match *self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                initial,
                max,
                factor,
                jitter,
            } => {
                let exp = retry.min(i32::MAX as u32) as i32;
                let secs = initial.as_secs_f64() * factor.powi(exp);
                let base = if !secs.is_finite() || secs < 0.0 || secs > max.as_secs_f64() {
                    max
                } else {
                    Duration::from_secs_f64(secs)
                };

                if jitter {
                    full_jitter(base)
                } else {
                    base
                }
            }
        }
    }
}

fn full_jitter(base: Duration) -> Duration {
    let ms = base.as_millis().min(u64::MAX as u128) as u64;
    if ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=ms))
}

/// Result of a single delivery try.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Delivered,
    /// The bus ran and refused; another attempt may succeed.
    Rejected { reason: String },
    /// The transport is missing; further attempts are pointless.
    Unreachable { reason: String },
}

impl From<Result<(), DeliveryError>> for AttemptOutcome {
    fn from(result: Result<(), DeliveryError>) -> Self {
        match result {
            Ok(()) => Self::Delivered,
            Err(DeliveryError::Rejected(reason)) => Self::Rejected { reason },
            Err(DeliveryError::Unreachable(reason)) => Self::Unreachable { reason },
        }
    }
}

impl AttemptOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Summary of one bounded retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryReport {
    /// Attempts actually made.
    pub attempts: u32,
    /// Outcome of the final attempt.
    pub outcome: AttemptOutcome,
}

impl RetryReport {
    pub fn is_delivered(&self) -> bool {
        self.outcome.is_delivered()
    }
}

/// Delivers one event, retrying a bounded number of times.
#[derive(Clone)]
pub struct PublishRetrier {
    transport: Arc<dyn BusTransport>,
}

impl PublishRetrier {
    pub fn new(transport: Arc<dyn BusTransport>) -> Self {
        Self { transport }
    }

    /// Exactly one delivery try. Never fails; transport errors become outcomes.
    pub async fn attempt(&self, event: &TranscriptionEvent) -> AttemptOutcome {
        AttemptOutcome::from(self.transport.deliver(event).await)
    }

    /// One try at delivering a WAL line as written.
    pub async fn attempt_line(&self, event: &TranscriptionEvent, line: &str) -> AttemptOutcome {
        AttemptOutcome::from(self.transport.deliver_line(event, line).await)
    }

    /// Try up to `max_attempts` times; true on the first acknowledged attempt.
    pub async fn publish_with_retry(
        &self,
        event: &TranscriptionEvent,
        max_attempts: u32,
        strategy: &RetryStrategy,
    ) -> bool {
        self.run(event, max_attempts, strategy).await.is_delivered()
    }

    /// Same loop as [`Self::publish_with_retry`], reporting how it ended.
    ///
    /// Sleeps between attempts only, never after the last one. An
    /// `Unreachable` outcome ends the loop early. `max_attempts` of 0 is
    /// treated as 1.
    pub async fn run(
        &self,
        event: &TranscriptionEvent,
        max_attempts: u32,
        strategy: &RetryStrategy,
    ) -> RetryReport {
        let max_attempts = max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.attempt(event).await {
                AttemptOutcome::Delivered => {
                    info!(
                        session_id = %event.session_id,
                        text_length = event.text.len(),
                        attempt,
                        "Published transcription event"
                    );
                    return RetryReport {
                        attempts: attempt,
                        outcome: AttemptOutcome::Delivered,
                    };
                }
                AttemptOutcome::Unreachable { reason } => {
                    error!(
                        session_id = %event.session_id,
                        attempt,
                        error = %reason,
                        "Bus unreachable, giving up on delivery"
                    );
                    return RetryReport {
                        attempts: attempt,
                        outcome: AttemptOutcome::Unreachable { reason },
                    };
                }
                AttemptOutcome::Rejected { reason } => {
                    if attempt >= max_attempts {
                        error!(
                            session_id = %event.session_id,
                            attempts = attempt,
                            error = %reason,
                            "Failed to publish after max attempts"
                        );
                        return RetryReport {
                            attempts: attempt,
                            outcome: AttemptOutcome::Rejected { reason },
                        };
                    }

                    let delay = strategy.delay_for(attempt - 1);
                    warn!(
                        session_id = %event.session_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %reason,
                        "Publish attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
