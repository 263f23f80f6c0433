use crate::BloodbankCliError;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

/// Raw command output from a bb subprocess.
#[derive(Debug, Clone)]
pub struct CommandRunOutput {
    pub stdout: String,
}

/// Responsible for locating and executing the Bloodbank CLI.
#[derive(Debug, Clone)]
pub struct BbCommandRunner {
    executable: String,
}

impl Default for BbCommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl BbCommandRunner {
    pub fn new() -> Self {
        Self {
            executable: resolve_bb_executable(),
        }
    }

    /// Use an explicit executable instead of the resolved `bb`.
    pub fn with_executable(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    /// Run `bb` with the given arguments, optionally feeding `input` on stdin.
    ///
    /// The child is killed if the timeout elapses.
    pub async fn run(
        &self,
        args: &[String],
        input: Option<&[u8]>,
        timeout_secs: u64,
    ) -> Result<CommandRunOutput, BloodbankCliError> {
        let command_repr = format!("{} {}", self.executable, args.join(" "));

        let mut cmd = Command::new(&self.executable);
        cmd.args(args);
        cmd.stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        apply_non_interactive_env(&mut cmd);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(BloodbankCliError::BbNotInstalled);
            }
            Err(err) => {
                return Err(BloodbankCliError::CommandFailed {
                    message: format!("failed to execute bb command: {err}"),
                    exit_code: None,
                    stderr: String::new(),
                    stdout: String::new(),
                });
            }
        };

        let stdin = child.stdin.take();
        let exchange = async move {
            if let (Some(mut stdin), Some(input)) = (stdin, input) {
                // A child may exit without reading stdin; its exit status decides.
                match stdin.write_all(input).await {
                    Ok(()) => stdin.shutdown().await?,
                    Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => {}
                    Err(err) => return Err(err),
                }
            }
            child.wait_with_output().await
        };

        let output = match timeout(Duration::from_secs(timeout_secs), exchange).await {
            Err(_) => {
                return Err(BloodbankCliError::Timeout {
                    command: command_repr,
                    timeout_secs,
                });
            }
            Ok(Err(err)) => {
                return Err(BloodbankCliError::CommandFailed {
                    message: format!("failed to communicate with bb command: {err}"),
                    exit_code: None,
                    stderr: String::new(),
                    stdout: String::new(),
                });
            }
            Ok(Ok(output)) => output,
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let exit_code = output.status.code();

        if output.status.success() {
            return Ok(CommandRunOutput { stdout });
        }

        Err(classify_failed_command(exit_code, &stdout, &stderr))
    }
}

fn apply_non_interactive_env(cmd: &mut Command) {
    cmd.env("NO_COLOR", "1");
    cmd.env("CLICOLOR", "0");
    cmd.env("PAGER", "cat");
}

pub(crate) fn resolve_bb_executable() -> String {
    if let Ok(path) = std::env::var("BB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    for candidate in ["/opt/homebrew/bin/bb", "/usr/local/bin/bb", "/usr/bin/bb"] {
        if Path::new(candidate).exists() {
            return candidate.to_string();
        }
    }

    "bb".to_string()
}

fn classify_failed_command(exit_code: Option<i32>, stdout: &str, stderr: &str) -> BloodbankCliError {
    let combined = format!("{stderr}\n{stdout}").to_ascii_lowercase();

    if combined.contains("unknown flag")
        || combined.contains("unknown command")
        || combined.contains("invalid value")
    {
        return BloodbankCliError::InvalidParams {
            message: non_empty(stderr, stdout, "invalid parameters"),
        };
    }

    BloodbankCliError::CommandFailed {
        message: non_empty(
            stderr,
            stdout,
            &format!("bb command failed with exit code {:?}", exit_code),
        ),
        exit_code,
        stderr: stderr.to_string(),
        stdout: stdout.to_string(),
    }
}

fn non_empty(primary: &str, secondary: &str, fallback: &str) -> String {
    if !primary.trim().is_empty() {
        primary.to_string()
    } else if !secondary.trim().is_empty() {
        secondary.to_string()
    } else {
        fallback.to_string()
    }
}
