//! # Bloodbank CLI Ops
//!
//! Typed orchestration of the Bloodbank `bb` command-line client.
//!
//! This crate owns executable resolution, availability detection, process
//! execution with timeout control, and error normalization for `bb publish`.
//! Callers never see raw `std::io` or exit-status values; every failure is
//! mapped onto [`BloodbankCliError`].
//!
//! ```ignore
//! use bloodbank_cli_ops::{detect, publish, BbCommandRunner, PublishInput};
//!
//! let runner = BbCommandRunner::new();
//! if detect(&runner).await?.installed {
//!     publish(&runner, PublishInput::new("transcription.voice.completed", payload)).await?;
//! }
//! ```

mod command_runner;
mod error;
mod operations;
mod types;

pub use command_runner::{BbCommandRunner, CommandRunOutput};
pub use error::BloodbankCliError;
pub use operations::{detect, publish};
pub use types::{CliDetection, PublishInput, PublishResult, DEFAULT_TIMEOUT_SECS};
