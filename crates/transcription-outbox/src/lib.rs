//! Durable publishing of completed transcriptions to Bloodbank.
//!
//! This crate provides:
//! - WalStore / WalHandle: append-only JSONL write-ahead log and its single owner task
//! - BusAvailability: cached bus probe with manual and time-boxed re-probe
//! - PublishRetrier: bounded delivery retries with fixed or exponential delays
//! - ReplayCompactor: one-shot backlog delivery that compacts the WAL
//! - TranscriptionPublisher: WAL first, then deliver

mod availability;
mod config;
mod error;
mod event;
mod publisher;
mod replay;
mod retry;
mod transport;
mod wal_owner;
mod wal_store;

pub use availability::{AvailabilityState, BusAvailability};
pub use config::{
    PublisherConfig, RetryStrategyConfig, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_SECONDS,
};
pub use error::{OutboxError, OutboxResult};
pub use event::{
    JsonObject, PublishRequest, TranscriptionEvent, DEFAULT_SOURCE, TRANSCRIPTION_EVENT_TYPE,
};
pub use publisher::TranscriptionPublisher;
pub use replay::{CorruptEntryPolicy, ReplayCompactor, ReplayReport};
pub use retry::{AttemptOutcome, PublishRetrier, RetryReport, RetryStrategy};
pub use transport::{BloodbankCliTransport, BusTransport, DeliveryError};
pub use wal_owner::{WalHandle, WalSnapshot};
pub use wal_store::{WalLine, WalLines, WalStore, DEFAULT_WAL_PATH};

#[cfg(test)]
mod tests;
