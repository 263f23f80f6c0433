//! Input and result types for bb operations.

use serde::{Deserialize, Serialize};

/// Default per-invocation timeout for bb commands.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Outcome of probing for the bb executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliDetection {
    /// The executable that was probed (e.g. "bb" or "/usr/local/bin/bb").
    pub executable: String,
    /// Whether the executable exists and is resolvable.
    pub installed: bool,
    /// The resolved path if installed.
    pub path: Option<String>,
}

/// Input for `bb publish <event_type> --json -`.
#[derive(Debug, Clone)]
pub struct PublishInput {
    pub event_type: String,
    /// Serialized JSON payload, written to the child's stdin.
    pub payload_json: String,
    pub timeout_secs: u64,
}

impl PublishInput {
    pub fn new(event_type: impl Into<String>, payload_json: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            payload_json: payload_json.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// Result of a successful publish.
#[derive(Debug, Clone, Serialize)]
pub struct PublishResult {
    pub event_type: String,
    /// Whatever bb printed on success (usually an event id).
    pub stdout: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_input_defaults_timeout() {
        let input = PublishInput::new("transcription.voice.completed", "{}");
        assert_eq!(input.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(input.with_timeout_secs(3).timeout_secs, 3);
    }

    #[test]
    fn cli_detection_serde() {
        let detection = CliDetection {
            executable: "bb".to_string(),
            installed: true,
            path: Some("/usr/local/bin/bb".to_string()),
        };
        let json = serde_json::to_string(&detection).unwrap();
        let back: CliDetection = serde_json::from_str(&json).unwrap();
        assert_eq!(back, detection);
    }
}
