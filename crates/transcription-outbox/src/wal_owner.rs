//! Single owner of the WAL file.
//!
//! Every append, snapshot and compaction goes through one task, so a publish
//! racing with a replay can never interleave with the rewrite. Compaction is
//! offset-based: lines appended after a snapshot was taken are carried over
//! verbatim behind the retained lines.

use crate::wal_store::{WalLine, WalStore};
use crate::{OutboxError, OutboxResult, TranscriptionEvent};
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Lines read from the WAL at one point in time.
#[derive(Debug, Clone, Default)]
pub struct WalSnapshot {
    pub lines: Vec<WalLine>,
}

impl WalSnapshot {
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

enum WalCommand {
    Append {
        line: Vec<u8>,
        reply: oneshot::Sender<io::Result<()>>,
    },
    Snapshot {
        reply: oneshot::Sender<io::Result<WalSnapshot>>,
    },
    Compact {
        snapshot_len: usize,
        retained: Vec<Vec<u8>>,
        reply: oneshot::Sender<io::Result<usize>>,
    },
    PendingCount {
        reply: oneshot::Sender<io::Result<usize>>,
    },
}

/// Cloneable handle to the WAL owner task.
#[derive(Clone)]
pub struct WalHandle {
    sender: mpsc::Sender<WalCommand>,
    path: PathBuf,
}

impl WalHandle {
    /// Spawn the owner task for `store`. Must be called inside a tokio runtime.
    ///
    /// The task exits once every handle has been dropped.
    pub fn spawn(store: WalStore) -> Self {
        let (sender, receiver) = mpsc::channel(DEFAULT_QUEUE_CAPACITY);
        let path = store.path().to_path_buf();
        tokio::spawn(run_owner(store, receiver));
        Self { sender, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event as a WAL line.
    pub async fn append(&self, event: &TranscriptionEvent) -> OutboxResult<()> {
        let line = event.to_wal_line()?.into_bytes();
        self.request(|reply| WalCommand::Append { line, reply }).await
    }

    /// Append a raw, already-serialized line.
    pub async fn append_line(&self, line: String) -> OutboxResult<()> {
        let line = line.into_bytes();
        self.request(|reply| WalCommand::Append { line, reply }).await
    }

    /// Read every line currently in the WAL.
    pub async fn snapshot(&self) -> OutboxResult<WalSnapshot> {
        self.request(|reply| WalCommand::Snapshot { reply }).await
    }

    /// Replace the first `snapshot_len` lines with `retained`, keeping any
    /// lines appended since the snapshot. Returns the resulting line count;
    /// the file is deleted when that count is zero.
    pub async fn compact(
        &self,
        snapshot_len: usize,
        retained: Vec<Vec<u8>>,
    ) -> OutboxResult<usize> {
        self.request(|reply| WalCommand::Compact {
            snapshot_len,
            retained,
            reply,
        })
        .await
    }

    pub async fn pending_count(&self) -> OutboxResult<usize> {
        self.request(|reply| WalCommand::PendingCount { reply }).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<io::Result<T>>) -> WalCommand,
    ) -> OutboxResult<T> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(build(reply))
            .await
            .map_err(|_| OutboxError::WalOwnerClosed)?;
        let result = response.await.map_err(|_| OutboxError::WalOwnerClosed)?;
        Ok(result?)
    }
}

async fn run_owner(store: WalStore, mut receiver: mpsc::Receiver<WalCommand>) {
    debug!(wal_path = %store.path().display(), "WAL owner started");

    while let Some(command) = receiver.recv().await {
        match command {
            WalCommand::Append { line, reply } => {
                let store = store.clone();
                let result = blocking(move || store.append_bytes(&line)).await;
                let _ = reply.send(result);
            }
            WalCommand::Snapshot { reply } => {
                let store = store.clone();
                let result = blocking(move || read_lines(&store).map(|lines| WalSnapshot { lines })).await;
                let _ = reply.send(result);
            }
            WalCommand::Compact {
                snapshot_len,
                retained,
                reply,
            } => {
                let store = store.clone();
                let result = blocking(move || compact(&store, snapshot_len, retained)).await;
                let _ = reply.send(result);
            }
            WalCommand::PendingCount { reply } => {
                let store = store.clone();
                let result = blocking(move || store.pending_count()).await;
                let _ = reply.send(result);
            }
        }
    }

    debug!(wal_path = %store.path().display(), "WAL owner stopped");
}

fn read_lines(store: &WalStore) -> io::Result<Vec<WalLine>> {
    store.read_all()?.collect()
}

fn compact(store: &WalStore, snapshot_len: usize, retained: Vec<Vec<u8>>) -> io::Result<usize> {
    let current = read_lines(store)?;

    if current.len() < snapshot_len {
        warn!(
            wal_path = %store.path().display(),
            expected = snapshot_len,
            found = current.len(),
            "WAL shrank since snapshot; compacting with what is left"
        );
    }

    let mut remaining = retained;
    remaining.extend(current.into_iter().skip(snapshot_len).map(|line| line.raw));

    store.rewrite(&remaining)?;
    Ok(remaining.len())
}

async fn blocking<T, F>(f: F) -> io::Result<T>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?
}
