// SPDX-License-Identifier: MIT

//! Subprocess helper shared by the git and script adapters.

use std::process::Output;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Timeout for git plumbing (clone, fetch, remote update).
pub const GIT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for user job scripts. Generous: builds are slow.
pub const JOB_SCRIPT_TIMEOUT: Duration = Duration::from_secs(3600);

/// Errors from subprocess execution.
#[derive(Debug, Error)]
pub enum SubprocessError {
    #[error("{label} failed to start: {source}")]
    Spawn {
        label: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{label} timed out after {timeout:?}")]
    Timeout { label: String, timeout: Duration },
}

/// Run a command to completion, capturing output, with a hard timeout.
///
/// The child is killed on drop, so a timeout does not leak a process.
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    label: &str,
) -> Result<Output, SubprocessError> {
    cmd.kill_on_drop(true);
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(source)) => Err(SubprocessError::Spawn { label: label.to_string(), source }),
        Err(_) => Err(SubprocessError::Timeout { label: label.to_string(), timeout }),
    }
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
