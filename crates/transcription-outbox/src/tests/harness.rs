//! Test harness for publisher integration tests.
//!
//! Provides:
//! - MockTransport: scripted bus that records every delivery
//! - TestHarness: temp WAL directory plus a publisher wired to a MockTransport

use crate::{
    BusTransport, DeliveryError, PublishRequest, PublisherConfig, TranscriptionEvent,
    TranscriptionPublisher, WalStore,
};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

/// Pauses the first delivery until released.
struct Gate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

/// In-memory bus.
///
/// Deliveries succeed unless a scripted outcome is queued or the event text
/// is in the reject set.
pub struct MockTransport {
    available: AtomicBool,
    probes: AtomicUsize,
    script: Mutex<VecDeque<Result<(), DeliveryError>>>,
    rejected_texts: Mutex<HashSet<String>>,
    attempts: Mutex<Vec<(TranscriptionEvent, Instant)>>,
    delivered: Mutex<Vec<TranscriptionEvent>>,
    payloads: Mutex<Vec<String>>,
    watched_wal: Mutex<Option<PathBuf>>,
    wal_lines_at_delivery: Mutex<Vec<usize>>,
    gate: Mutex<Option<Gate>>,
}

impl MockTransport {
    fn with_availability(available: bool) -> Self {
        Self {
            available: AtomicBool::new(available),
            probes: AtomicUsize::new(0),
            script: Mutex::new(VecDeque::new()),
            rejected_texts: Mutex::new(HashSet::new()),
            attempts: Mutex::new(Vec::new()),
            delivered: Mutex::new(Vec::new()),
            payloads: Mutex::new(Vec::new()),
            watched_wal: Mutex::new(None),
            wal_lines_at_delivery: Mutex::new(Vec::new()),
            gate: Mutex::new(None),
        }
    }

    pub fn available() -> Self {
        Self::with_availability(true)
    }

    pub fn unavailable() -> Self {
        Self::with_availability(false)
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// Queue outcomes for the next deliveries, in order.
    pub fn script(&self, outcomes: impl IntoIterator<Item = Result<(), DeliveryError>>) {
        self.script.lock().unwrap().extend(outcomes);
    }

    /// Reject every delivery of an event with this text.
    pub fn reject_text(&self, text: &str) {
        self.rejected_texts.lock().unwrap().insert(text.to_string());
    }

    /// Record the WAL line count at `path` whenever a delivery starts.
    pub fn watch_wal(&self, path: &Path) {
        *self.watched_wal.lock().unwrap() = Some(path.to_path_buf());
    }

    /// Hold the next delivery until the returned `release` is notified.
    /// `entered` fires once that delivery has started.
    pub fn gate_next_delivery(&self) -> (Arc<Notify>, Arc<Notify>) {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Gate {
            entered: entered.clone(),
            release: release.clone(),
        });
        (entered, release)
    }

    /// Every delivery attempt, successful or not.
    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    /// Events the bus acknowledged, in order.
    pub fn delivered(&self) -> Vec<TranscriptionEvent> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn delivered_texts(&self) -> Vec<String> {
        self.delivered().into_iter().map(|e| e.text).collect()
    }

    /// Exact JSON handed to the bus for each acknowledged delivery.
    pub fn payloads(&self) -> Vec<String> {
        self.payloads.lock().unwrap().clone()
    }

    pub fn wal_lines_at_delivery(&self) -> Vec<usize> {
        self.wal_lines_at_delivery.lock().unwrap().clone()
    }

    async fn record(
        &self,
        event: &TranscriptionEvent,
        payload: String,
    ) -> Result<(), DeliveryError> {
        let watched = self.watched_wal.lock().unwrap().clone();
        if let Some(path) = watched {
            let count = read_wal_lines(&path).len();
            self.wal_lines_at_delivery.lock().unwrap().push(count);
        }

        self.attempts
            .lock()
            .unwrap()
            .push((event.clone(), Instant::now()));

        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let scripted = self.script.lock().unwrap().pop_front();
        let outcome = match scripted {
            Some(outcome) => outcome,
            None if self.rejected_texts.lock().unwrap().contains(&event.text) => {
                Err(DeliveryError::Rejected(format!("rejected {}", event.text)))
            }
            None => Ok(()),
        };

        if outcome.is_ok() {
            self.delivered.lock().unwrap().push(event.clone());
            self.payloads.lock().unwrap().push(payload);
        }
        outcome
    }
}

#[async_trait]
impl BusTransport for MockTransport {
    async fn is_available(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.available.load(Ordering::SeqCst)
    }

    async fn deliver(&self, event: &TranscriptionEvent) -> Result<(), DeliveryError> {
        self.record(event, event.to_wal_line().unwrap()).await
    }

    async fn deliver_line(
        &self,
        event: &TranscriptionEvent,
        line: &str,
    ) -> Result<(), DeliveryError> {
        self.record(event, line.to_string()).await
    }
}

/// Non-blank lines of a WAL file as bytes; empty when the file is missing.
pub fn read_wal_raw(path: &Path) -> Vec<Vec<u8>> {
    match std::fs::read(path) {
        Ok(content) => content
            .split(|b| *b == b'\n')
            .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
            .map(<[u8]>::to_vec)
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Non-blank lines of a WAL file; invalid UTF-8 shows up lossily.
pub fn read_wal_lines(path: &Path) -> Vec<String> {
    read_wal_raw(path)
        .iter()
        .map(|line| String::from_utf8_lossy(line).trim_end_matches('\r').to_string())
        .collect()
}

/// A publisher over a MockTransport with its WAL in a temp directory.
pub struct TestHarness {
    pub transport: Arc<MockTransport>,
    pub config: PublisherConfig,
    pub session_id: Uuid,
    dir: TempDir,
}

impl TestHarness {
    /// Bus available, WAL enabled, 3 attempts with 1s fixed delay.
    pub fn new() -> Self {
        Self::with_transport(MockTransport::available())
    }

    pub fn with_transport(transport: MockTransport) -> Self {
        let dir = TempDir::new().unwrap();
        let config = PublisherConfig {
            wal_path: dir.path().join("raw_voice_ingest.jsonl"),
            ..PublisherConfig::default()
        };

        Self {
            transport: Arc::new(transport),
            config,
            session_id: Uuid::new_v4(),
            dir,
        }
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn wal_path(&self) -> &Path {
        &self.config.wal_path
    }

    pub fn publisher(&self) -> TranscriptionPublisher {
        TranscriptionPublisher::new(&self.config, self.transport.clone())
    }

    pub fn request(&self, text: &str) -> PublishRequest {
        PublishRequest::new(text, self.session_id)
    }

    pub fn event(&self, text: &str) -> TranscriptionEvent {
        TranscriptionEvent::from_request(self.request(text)).unwrap()
    }

    /// Seed the WAL with events for `texts`, bypassing the publisher.
    pub fn seed_wal(&self, texts: &[&str]) -> Vec<TranscriptionEvent> {
        let store = WalStore::new(self.wal_path());
        texts
            .iter()
            .map(|text| {
                let event = self.event(text);
                store.append(&event).unwrap();
                event
            })
            .collect()
    }

    /// Append a raw line to the WAL.
    pub fn seed_raw(&self, line: &str) {
        self.seed_bytes(line.as_bytes());
    }

    /// Append a line of arbitrary bytes to the WAL.
    pub fn seed_bytes(&self, line: &[u8]) {
        WalStore::new(self.wal_path()).append_bytes(line).unwrap();
    }

    pub fn wal_lines(&self) -> Vec<String> {
        read_wal_lines(self.wal_path())
    }

    pub fn wal_texts(&self) -> Vec<String> {
        self.wal_lines()
            .iter()
            .map(|line| TranscriptionEvent::from_wal_line(line).unwrap().text)
            .collect()
    }
}
