//! Write-ahead publisher for transcription events.

use crate::availability::AvailabilityState;
use crate::replay::{ReplayCompactor, ReplayReport};
use crate::wal_store::WalStore;
use crate::{
    AttemptOutcome, BloodbankCliTransport, BusAvailability, BusTransport, OutboxResult,
    PublishRequest, PublishRetrier, PublisherConfig, RetryStrategy, TranscriptionEvent, WalHandle,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Publishes transcription events to Bloodbank, logging each to the WAL
/// first so nothing accepted is lost while the bus is down.
///
/// Must be created inside a tokio runtime (it owns the WAL task).
pub struct TranscriptionPublisher {
    transport: Arc<dyn BusTransport>,
    availability: Arc<BusAvailability>,
    retrier: PublishRetrier,
    strategy: RetryStrategy,
    max_retries: u32,
    enable_wal: bool,
    wal: WalHandle,
    compactor: ReplayCompactor,
}

impl TranscriptionPublisher {
    pub fn new(config: &PublisherConfig, transport: Arc<dyn BusTransport>) -> Self {
        let availability = Arc::new(BusAvailability::new(config.reprobe_after()));
        let wal = WalHandle::spawn(WalStore::new(config.wal_path.clone()));
        let compactor = ReplayCompactor::new(
            wal.clone(),
            transport.clone(),
            availability.clone(),
            config.corrupt_entries.clone(),
        );

        Self {
            retrier: PublishRetrier::new(transport.clone()),
            transport,
            availability,
            strategy: config.retry_strategy(),
            max_retries: config.max_retries,
            enable_wal: config.enable_wal,
            wal,
            compactor,
        }
    }

    /// Publisher backed by the `bb` CLI.
    pub fn with_bloodbank_cli(config: &PublisherConfig) -> Self {
        let transport = BloodbankCliTransport::new(config.command_timeout_seconds);
        Self::new(config, Arc::new(transport))
    }

    /// Publish one transcription.
    ///
    /// Returns true only when the bus acknowledged the event. A false return
    /// with the WAL enabled means the event is backlogged (or the text was
    /// blank, in which case nothing happened at all).
    pub async fn publish(&self, request: PublishRequest) -> bool {
        let session_id = request.session_id;
        match TranscriptionEvent::from_request(request) {
            Some(event) => self.publish_event(event).await,
            None => {
                warn!(%session_id, "Attempted to publish empty transcription");
                false
            }
        }
    }

    /// Publish an already-built event.
    pub async fn publish_event(&self, event: TranscriptionEvent) -> bool {
        if event.text.trim().is_empty() {
            warn!(session_id = %event.session_id, "Attempted to publish empty transcription");
            return false;
        }

        if self.enable_wal {
            match self.wal.append(&event).await {
                Ok(()) => debug!(session_id = %event.session_id, "Wrote event to WAL"),
                Err(err) => error!(
                    session_id = %event.session_id,
                    wal_path = %self.wal.path().display(),
                    error = %err,
                    "WAL write failed - event may be lost"
                ),
            }
        }

        if !self.availability.check(self.transport.as_ref()).await {
            warn!(
                session_id = %event.session_id,
                "Bloodbank not available - event saved to WAL only"
            );
            return false;
        }

        let report = self
            .retrier
            .run(&event, self.max_retries, &self.strategy)
            .await;
        if matches!(report.outcome, AttemptOutcome::Unreachable { .. }) {
            self.availability.mark_unavailable().await;
        }
        report.is_delivered()
    }

    /// Deliver the WAL backlog once. Returns the number of entries delivered.
    pub async fn replay(&self) -> usize {
        match self.replay_report().await {
            Ok(report) => report.delivered,
            Err(err) => {
                error!(
                    wal_path = %self.wal.path().display(),
                    error = %err,
                    "WAL replay failed"
                );
                0
            }
        }
    }

    /// Deliver the WAL backlog once, reporting how every line fared.
    pub async fn replay_report(&self) -> OutboxResult<ReplayReport> {
        self.compactor.run().await
    }

    /// Forget the cached availability verdict and probe again.
    pub async fn reprobe(&self) -> bool {
        self.availability.reprobe(self.transport.as_ref()).await
    }

    pub async fn availability_state(&self) -> AvailabilityState {
        self.availability.state().await
    }

    /// Non-blank lines currently in the WAL.
    pub async fn pending_count(&self) -> OutboxResult<usize> {
        self.wal.pending_count().await
    }

    pub fn wal_path(&self) -> &Path {
        self.wal.path()
    }
}
