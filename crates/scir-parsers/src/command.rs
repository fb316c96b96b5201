//! Command execution utilities for scheduler queries.

use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::process::Command;

/// Error type for command execution.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Failed to execute {command}: {error}")]
    Execution { command: String, error: String },
    #[error("Command {command} failed: {stderr}")]
    Failed { command: String, stderr: String },
}

/// Execute a command and return stdout as a string.
///
/// This is a convenience wrapper that handles common error cases
/// and UTF-8 conversion for scheduler command output.
pub async fn run_command(cmd: &mut Command, name: &str) -> Result<String, CommandError> {
    let output = cmd.output().await.map_err(|e| CommandError::Execution {
        command: name.to_string(),
        error: e.to_string(),
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CommandError::Failed {
            command: name.to_string(),
            stderr: stderr.to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Captured result of a `bash -c` invocation.
///
/// Output is kept as raw bytes: several schedulers emit junk binary data in
/// their listings, so callers decide how to decode it.
#[derive(Debug, Clone)]
pub struct ShellOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ShellOutput {
    /// Stdout decoded lossily as UTF-8.
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Stderr decoded lossily as UTF-8.
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// True when stdout is blank but stderr is not, which is how a scheduler
    /// CLI that could not run at all usually presents itself.
    pub fn is_blank_with_errors(&self) -> bool {
        self.stdout.iter().all(u8::is_ascii_whitespace)
            && !self.stderr.iter().all(u8::is_ascii_whitespace)
    }
}

/// Run a full shell command line through `bash -c` with stdin closed,
/// capturing stdout and stderr separately.
///
/// The exit status is returned rather than checked; scheduler CLIs are
/// inconsistent about it and their output is what gets parsed.
pub async fn run_shell(command_line: &str) -> Result<ShellOutput, CommandError> {
    tracing::debug!(command = command_line, "running shell command");
    let output = Command::new("bash")
        .arg("-c")
        .arg(command_line)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| CommandError::Execution {
            command: command_line.to_string(),
            error: e.to_string(),
        })?;

    Ok(ShellOutput {
        status: output.status,
        stdout: output.stdout,
        stderr: output.stderr,
    })
}
