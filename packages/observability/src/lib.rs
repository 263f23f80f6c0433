//! # Observability
//!
//! Logging setup shared by the transcription relay binaries.
//!
//! Library crates only use `tracing` macros with structured fields. Binaries
//! call [`init_with_config`] once at startup to decide where those events go:
//!
//! - with a `log_path`: one JSON object per line appended to that file
//!   (`timestamp, level, service, pid, target, message, fields`), flushed per
//!   line so `tail -f log.jsonl | jq` works while the process runs
//! - without one: a compact human-readable formatter on stderr
//!
//! `RUST_LOG` overrides the configured default level.
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "transcription-relay".into(),
//!     default_level: "debug".into(),
//!     ..Default::default()
//! })?;
//! ```

mod file_writer;
mod json_layer;

pub use file_writer::{JsonlFileWriter, WriterFactory};
pub use json_layer::{JsonLayer, LogEntry};

use std::io;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, included in every JSONL entry.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Append structured JSONL to this file instead of logging to stderr.
    pub log_path: Option<PathBuf>,

    /// With a `log_path`, also emit compact logs to stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Initialize logging with default settings for `service_name`.
pub fn init(service_name: &str) -> io::Result<()> {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    })
}

/// Install the global subscriber described by `config`.
///
/// Fails if the log file cannot be opened or a global subscriber is
/// already installed.
pub fn init_with_config(config: LogConfig) -> io::Result<()> {
    let Some(log_path) = config.log_path.clone() else {
        return tracing_subscriber::fmt()
            .with_env_filter(env_filter(&config.default_level))
            .with_target(true)
            .with_writer(io::stderr)
            .compact()
            .try_init()
            .map_err(io::Error::other);
    };

    let writer = JsonlFileWriter::new(&log_path)?;
    let json_layer = JsonLayer::new(config.service_name.clone(), WriterFactory::new(writer));

    let stderr_layer = config.also_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_writer(io::stderr)
            .with_filter(env_filter(&config.default_level))
    });

    tracing_subscriber::registry()
        .with(json_layer.with_filter(env_filter(&config.default_level)))
        .with(stderr_layer)
        .try_init()
        .map_err(io::Error::other)?;

    tracing::debug!(
        log_path = %log_path.display(),
        service = %config.service_name,
        "observability initialized"
    );
    Ok(())
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, trace, warn};
