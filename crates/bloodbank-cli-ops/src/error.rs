use thiserror::Error;

/// Error taxonomy for Bloodbank CLI orchestration.
#[derive(Debug, Error)]
pub enum BloodbankCliError {
    #[error("Bloodbank CLI (bb) is not installed")]
    BbNotInstalled,

    #[error("Invalid parameters: {message}")]
    InvalidParams { message: String },

    #[error("Bloodbank CLI command failed: {message}")]
    CommandFailed {
        message: String,
        exit_code: Option<i32>,
        stderr: String,
        stdout: String,
    },

    #[error("Bloodbank CLI command timed out after {timeout_secs}s: {command}")]
    Timeout { command: String, timeout_secs: u64 },

    #[error("Availability check failed: {message}")]
    CheckFailed { message: String },
}

impl BloodbankCliError {
    /// Stable machine-readable error code for logs and CLI output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BbNotInstalled => "bb_not_installed",
            Self::InvalidParams { .. } => "invalid_params",
            Self::CommandFailed { .. } => "command_failed",
            Self::Timeout { .. } => "timeout",
            Self::CheckFailed { .. } => "check_failed",
        }
    }

    /// Whether the failure means the bus cannot be reached at all, as opposed
    /// to a single rejected attempt.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::BbNotInstalled)
    }
}
