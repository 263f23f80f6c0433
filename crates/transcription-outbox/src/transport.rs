//! Bus transport seam.

use crate::{TranscriptionEvent, TRANSCRIPTION_EVENT_TYPE};
use async_trait::async_trait;
use bloodbank_cli_ops::{BbCommandRunner, PublishInput, DEFAULT_TIMEOUT_SECS};
use thiserror::Error;
use tracing::{error, warn};

/// Why a single delivery did not go through.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The transport itself is missing; retrying cannot help.
    #[error("bus unreachable: {0}")]
    Unreachable(String),

    /// The transport ran and reported failure (non-zero exit, timeout, ...).
    #[error("delivery rejected: {0}")]
    Rejected(String),
}

/// Something that can hand a [`TranscriptionEvent`] to the bus.
#[async_trait]
pub trait BusTransport: Send + Sync {
    /// Probe whether the bus endpoint can be reached at all.
    async fn is_available(&self) -> bool;

    /// One delivery try. `Ok(())` means the bus acknowledged the event.
    async fn deliver(&self, event: &TranscriptionEvent) -> Result<(), DeliveryError>;

    /// Deliver a WAL line that decoded to `event`, sending `line` as written
    /// so fields the event type does not model reach the bus too.
    async fn deliver_line(
        &self,
        event: &TranscriptionEvent,
        _line: &str,
    ) -> Result<(), DeliveryError> {
        self.deliver(event).await
    }
}

/// Production transport: `bb publish transcription.voice.completed --json -`.
#[derive(Debug, Clone)]
pub struct BloodbankCliTransport {
    runner: BbCommandRunner,
    timeout_secs: u64,
}

impl Default for BloodbankCliTransport {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT_SECS)
    }
}

impl BloodbankCliTransport {
    pub fn new(timeout_secs: u64) -> Self {
        Self::with_runner(BbCommandRunner::new(), timeout_secs)
    }

    pub fn with_runner(runner: BbCommandRunner, timeout_secs: u64) -> Self {
        Self {
            runner,
            timeout_secs,
        }
    }

    pub fn executable(&self) -> &str {
        self.runner.executable()
    }

    async fn publish_payload(&self, payload: String) -> Result<(), DeliveryError> {
        let input = PublishInput::new(TRANSCRIPTION_EVENT_TYPE, payload)
            .with_timeout_secs(self.timeout_secs);

        match bloodbank_cli_ops::publish(&self.runner, input).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_unreachable() => {
                error!("bb command not found - is Bloodbank installed?");
                Err(DeliveryError::Unreachable(err.to_string()))
            }
            Err(err) => {
                error!(code = err.code(), error = %err, "bb publish failed");
                Err(DeliveryError::Rejected(err.to_string()))
            }
        }
    }
}

#[async_trait]
impl BusTransport for BloodbankCliTransport {
    async fn is_available(&self) -> bool {
        match bloodbank_cli_ops::detect(&self.runner).await {
            Ok(detection) => detection.installed,
            Err(err) => {
                warn!(error = %err, "Error checking bb availability");
                false
            }
        }
    }

    async fn deliver(&self, event: &TranscriptionEvent) -> Result<(), DeliveryError> {
        let payload = event
            .to_wal_line()
            .map_err(|err| DeliveryError::Rejected(format!("failed to encode event: {err}")))?;
        self.publish_payload(payload).await
    }

    async fn deliver_line(
        &self,
        _event: &TranscriptionEvent,
        line: &str,
    ) -> Result<(), DeliveryError> {
        self.publish_payload(line.to_string()).await
    }
}
