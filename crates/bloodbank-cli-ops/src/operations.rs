//! bb operations.

use crate::command_runner::BbCommandRunner;
use crate::types::{CliDetection, PublishInput, PublishResult};
use crate::BloodbankCliError;
use std::path::Path;
use tracing::debug;

/// Detect whether the runner's bb executable is installed.
///
/// Explicit paths are checked on disk; bare names are resolved with
/// `which <name>` so the caller's PATH applies.
pub async fn detect(runner: &BbCommandRunner) -> Result<CliDetection, BloodbankCliError> {
    let executable = runner.executable().to_string();
    debug!(executable = %executable, "Checking for bb executable");

    if executable.contains(std::path::MAIN_SEPARATOR) {
        let installed = Path::new(&executable).is_file();
        return Ok(CliDetection {
            path: installed.then(|| executable.clone()),
            executable,
            installed,
        });
    }

    let output = tokio::process::Command::new("which")
        .arg(&executable)
        .output()
        .await
        .map_err(|err| BloodbankCliError::CheckFailed {
            message: format!("failed to run which: {err}"),
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let installed = output.status.success() && !stdout.is_empty();

    debug!(executable = %executable, installed, path = %stdout, "bb detection finished");

    Ok(CliDetection {
        executable,
        installed,
        path: installed.then_some(stdout),
    })
}

/// Publish one JSON payload: `bb publish <event_type> --json -`.
pub async fn publish(
    runner: &BbCommandRunner,
    input: PublishInput,
) -> Result<PublishResult, BloodbankCliError> {
    if input.event_type.trim().is_empty() {
        return Err(BloodbankCliError::InvalidParams {
            message: "event_type is required".to_string(),
        });
    }
    if input.payload_json.trim().is_empty() {
        return Err(BloodbankCliError::InvalidParams {
            message: "payload must not be empty".to_string(),
        });
    }

    let args = vec![
        "publish".to_string(),
        input.event_type.clone(),
        "--json".to_string(),
        "-".to_string(),
    ];

    let output = runner
        .run(&args, Some(input.payload_json.as_bytes()), input.timeout_secs)
        .await?;

    debug!(event_type = %input.event_type, stdout = %output.stdout, "bb publish succeeded");

    Ok(PublishResult {
        event_type: input.event_type,
        stdout: output.stdout,
    })
}
