//! WAL replay and compaction.

use crate::wal_store::{WalLine, WalStore};
use crate::{
    AttemptOutcome, BusAvailability, BusTransport, OutboxResult, PublishRetrier,
    TranscriptionEvent, WalHandle,
};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// What replay does with WAL lines that do not decode as events, including
/// lines that are not valid UTF-8.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "camelCase")]
pub enum CorruptEntryPolicy {
    /// Keep them in the active WAL.
    #[default]
    Retain,
    /// Move them to a dead-letter JSONL file. Lines that cannot be written
    /// there stay in the WAL.
    Quarantine { path: PathBuf },
}

/// Per-line classification of one replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub delivered: usize,
    pub delivery_failed: usize,
    pub corrupt: usize,
    /// Corrupt lines moved to the quarantine file (subset of `corrupt`).
    pub quarantined: usize,
}

impl ReplayReport {
    /// Lines left in the WAL from the replayed snapshot.
    pub fn retained(&self) -> usize {
        self.delivery_failed + self.corrupt - self.quarantined
    }
}

/// Delivers the WAL backlog once and compacts away what went through.
pub struct ReplayCompactor {
    wal: WalHandle,
    transport: Arc<dyn BusTransport>,
    retrier: PublishRetrier,
    availability: Arc<BusAvailability>,
    corrupt_policy: CorruptEntryPolicy,
    running: Mutex<()>,
}

impl ReplayCompactor {
    pub fn new(
        wal: WalHandle,
        transport: Arc<dyn BusTransport>,
        availability: Arc<BusAvailability>,
        corrupt_policy: CorruptEntryPolicy,
    ) -> Self {
        Self {
            wal,
            retrier: PublishRetrier::new(transport.clone()),
            transport,
            availability,
            corrupt_policy,
            running: Mutex::new(()),
        }
    }

    /// One pass over the WAL: a single delivery try per parseable line.
    ///
    /// A parseable line is delivered exactly as it sits in the WAL, so keys
    /// unknown to [`TranscriptionEvent`] are forwarded untouched.
    ///
    /// Passes never overlap. Lines appended while a pass runs are left for
    /// the next one.
    pub async fn run(&self) -> OutboxResult<ReplayReport> {
        let _guard = self.running.lock().await;

        let snapshot = self.wal.snapshot().await?;
        if snapshot.is_empty() {
            // Clears a file holding only blank lines.
            self.wal.compact(0, Vec::new()).await?;
            debug!(wal_path = %self.wal.path().display(), "WAL empty, nothing to replay");
            return Ok(ReplayReport::default());
        }

        if !self.availability.check(self.transport.as_ref()).await {
            warn!(
                wal_path = %self.wal.path().display(),
                pending = snapshot.len(),
                "Bloodbank not available - cannot replay WAL"
            );
            return Ok(ReplayReport::default());
        }

        info!(
            wal_path = %self.wal.path().display(),
            pending = snapshot.len(),
            "Replaying WAL"
        );

        let mut report = ReplayReport::default();
        let mut retained = Vec::new();
        let mut unreachable = false;

        for line in &snapshot.lines {
            let (text, event) = match decode(line) {
                Ok(decoded) => decoded,
                Err(err) => {
                    report.corrupt += 1;
                    error!(
                        wal_path = %self.wal.path().display(),
                        line = line.line_number,
                        error = %err,
                        "Corrupt WAL entry"
                    );
                    if self.quarantine(line).await {
                        report.quarantined += 1;
                    } else {
                        retained.push(line.raw.clone());
                    }
                    continue;
                }
            };

            if unreachable {
                report.delivery_failed += 1;
                retained.push(line.raw.clone());
                continue;
            }

            match self.retrier.attempt_line(&event, text).await {
                AttemptOutcome::Delivered => report.delivered += 1,
                AttemptOutcome::Rejected { reason } => {
                    warn!(
                        session_id = %event.session_id,
                        line = line.line_number,
                        error = %reason,
                        "Replay delivery failed, keeping entry"
                    );
                    report.delivery_failed += 1;
                    retained.push(line.raw.clone());
                }
                AttemptOutcome::Unreachable { reason } => {
                    error!(
                        line = line.line_number,
                        error = %reason,
                        "Bus became unreachable during replay"
                    );
                    self.availability.mark_unavailable().await;
                    unreachable = true;
                    report.delivery_failed += 1;
                    retained.push(line.raw.clone());
                }
            }
        }

        let remaining = self.wal.compact(snapshot.len(), retained).await?;

        info!(
            wal_path = %self.wal.path().display(),
            delivered = report.delivered,
            delivery_failed = report.delivery_failed,
            corrupt = report.corrupt,
            quarantined = report.quarantined,
            remaining,
            "WAL replay finished"
        );
        Ok(report)
    }

    /// True when the line now lives in the quarantine file.
    async fn quarantine(&self, line: &WalLine) -> bool {
        let CorruptEntryPolicy::Quarantine { path } = &self.corrupt_policy else {
            return false;
        };

        let store = WalStore::new(path.clone());
        let raw = line.raw.clone();
        let result = tokio::task::spawn_blocking(move || store.append_bytes(&raw))
            .await
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))
            .and_then(|result| result);

        match result {
            Ok(()) => {
                info!(
                    quarantine_path = %path.display(),
                    line = line.line_number,
                    "Quarantined corrupt WAL entry"
                );
                true
            }
            Err(err) => {
                error!(
                    quarantine_path = %path.display(),
                    line = line.line_number,
                    error = %err,
                    "Failed to quarantine corrupt WAL entry, keeping it in the WAL"
                );
                false
            }
        }
    }
}

fn decode(line: &WalLine) -> Result<(&str, TranscriptionEvent), String> {
    let text = line.text().map_err(|err| format!("not UTF-8: {err}"))?;
    let event = TranscriptionEvent::from_wal_line(text).map_err(|err| err.to_string())?;
    Ok((text, event))
}
