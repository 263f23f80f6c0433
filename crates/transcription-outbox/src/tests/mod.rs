//! Integration tests for the transcription publisher.
//!
//! - `harness.rs`     - MockTransport and a temp-dir publisher harness
//! - `publish.rs`     - WAL-first publish, availability short-circuit, bounded retries
//! - `replay.rs`      - backlog delivery, compaction, corrupt entry handling
//! - `concurrency.rs` - publishes racing replays, overlapping replays

pub(crate) mod harness;
