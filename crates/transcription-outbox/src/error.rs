//! Outbox error types.

use thiserror::Error;

/// Outbox error type.
#[derive(Error, Debug)]
pub enum OutboxError {
    /// Filesystem error while touching the WAL
    #[error("WAL I/O error: {0}")]
    Wal(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The WAL owner task has stopped
    #[error("WAL owner is no longer running")]
    WalOwnerClosed,
}

/// Result type alias using OutboxError.
pub type OutboxResult<T> = Result<T, OutboxError>;
