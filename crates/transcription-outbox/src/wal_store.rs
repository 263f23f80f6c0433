//! Append-only JSONL write-ahead log.
//!
//! One serialized [`TranscriptionEvent`] per line. Lines are only ever
//! appended, or dropped wholesale by [`WalStore::rewrite`] during compaction.
//! Lines are handled as bytes: a torn or otherwise undecodable line is
//! surfaced as its own [`WalLine`] and written back byte-for-byte.
//! The store itself is not synchronized; [`crate::WalHandle`] is the single
//! owner that serializes access inside a process.

use crate::{OutboxResult, TranscriptionEvent};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Split, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default WAL location, relative to the working directory.
pub const DEFAULT_WAL_PATH: &str = "raw_voice_ingest.jsonl";

/// A non-blank WAL line with its 1-based physical line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalLine {
    pub line_number: usize,
    /// Line content without the newline or surrounding ASCII whitespace.
    pub raw: Vec<u8>,
}

impl WalLine {
    /// The line as UTF-8, if it is valid UTF-8.
    pub fn text(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.raw)
    }
}

/// File-backed WAL.
#[derive(Debug, Clone)]
pub struct WalStore {
    path: PathBuf,
}

impl WalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Serialize `event` and append it as one line.
    pub fn append(&self, event: &TranscriptionEvent) -> OutboxResult<()> {
        let line = event.to_wal_line()?;
        self.append_line(&line)?;
        Ok(())
    }

    /// Append a raw line, creating parent directories if needed.
    pub fn append_line(&self, line: &str) -> io::Result<()> {
        self.append_bytes(line.as_bytes())
    }

    /// Append one line of arbitrary bytes.
    ///
    /// The line and its newline go out in a single write, followed by fsync.
    pub fn append_bytes(&self, line: &[u8]) -> io::Result<()> {
        self.ensure_parent_dir()?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line);
        buf.push(b'\n');
        file.write_all(&buf)?;
        file.sync_data()?;

        debug!(wal_path = %self.path.display(), bytes = buf.len(), "Appended WAL line");
        Ok(())
    }

    /// Lazily iterate the non-blank lines currently in the file.
    ///
    /// A missing file yields an empty iterator. Calling this again restarts
    /// from the first line.
    pub fn read_all(&self) -> io::Result<WalLines> {
        match File::open(&self.path) {
            Ok(file) => Ok(WalLines {
                inner: Some(BufReader::new(file).split(b'\n')),
                line_number: 0,
            }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(WalLines::empty()),
            Err(err) => Err(err),
        }
    }

    /// Replace the file content with exactly `remaining`, in order.
    ///
    /// Writes a sibling temp file and renames it over the WAL. An empty
    /// `remaining` deletes the WAL instead of leaving an empty file.
    pub fn rewrite(&self, remaining: &[Vec<u8>]) -> io::Result<()> {
        if remaining.is_empty() {
            return match fs::remove_file(&self.path) {
                Ok(()) => {
                    debug!(wal_path = %self.path.display(), "Removed WAL");
                    Ok(())
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(err) => Err(err),
            };
        }

        self.ensure_parent_dir()?;
        let tmp_path = self.temp_path();
        {
            let mut tmp = File::create(&tmp_path)?;
            for line in remaining {
                tmp.write_all(line)?;
                tmp.write_all(b"\n")?;
            }
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        debug!(
            wal_path = %self.path.display(),
            lines = remaining.len(),
            "Rewrote WAL"
        );
        Ok(())
    }

    /// Number of non-blank lines (0 when the file does not exist).
    pub fn pending_count(&self) -> io::Result<usize> {
        let mut count = 0;
        for line in self.read_all()? {
            line?;
            count += 1;
        }
        Ok(count)
    }

    fn ensure_parent_dir(&self) -> io::Result<()> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
            _ => Ok(()),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".compact.tmp");
        self.path.with_file_name(name)
    }
}

/// Iterator over [`WalLine`]s, skipping blank lines.
pub struct WalLines {
    inner: Option<Split<BufReader<File>>>,
    line_number: usize,
}

impl WalLines {
    fn empty() -> Self {
        Self {
            inner: None,
            line_number: 0,
        }
    }
}

impl Iterator for WalLines {
    type Item = io::Result<WalLine>;

    fn next(&mut self) -> Option<Self::Item> {
        let lines = self.inner.as_mut()?;
        loop {
            let line = match lines.next()? {
                Ok(line) => line,
                Err(err) => return Some(Err(err)),
            };
            self.line_number += 1;

            let trimmed = trim_ascii(&line);
            if trimmed.is_empty() {
                continue;
            }
            return Some(Ok(WalLine {
                line_number: self.line_number,
                raw: trimmed.to_vec(),
            }));
        }
    }
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}
