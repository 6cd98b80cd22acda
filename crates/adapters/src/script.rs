// SPDX-License-Identifier: MIT

//! Job-script discovery and execution.

use crate::subprocess::{SubprocessError, JOB_SCRIPT_TIMEOUT};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// Errors from job-script execution.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error(transparent)]
    Subprocess(#[from] SubprocessError),
    #[error("failed to spawn {script}: {source}")]
    Spawn {
        script: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{script} terminated without an exit code")]
    NoExitCode { script: PathBuf },
}

/// Find the job script for `(repo_id, job_base)` in a workspace.
///
/// Iterative walk starting at the workspace root, descending only into
/// directories whose name case-insensitively contains `dmakr`. Filename
/// priority is two-tier: `{repo_id}.{job_base}.sh` wins immediately,
/// `dmakr.{job_base}.sh` is remembered as a fallback.
pub fn find_job_file(workspace: &Path, repo_id: &str, job_base: &str) -> Option<PathBuf> {
    let specific = format!("{repo_id}.{job_base}.sh");
    let generic = format!("dmakr.{job_base}.sh");

    let mut fallback = None;
    let mut stack = vec![workspace.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        // Deterministic traversal regardless of directory order.
        let mut entries: Vec<_> = entries.flatten().collect();
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let path = entry.path();
            if path.is_dir() {
                if name.to_lowercase().contains("dmakr") {
                    stack.push(path);
                }
            } else if name == specific {
                return Some(path);
            } else if name == generic && fallback.is_none() {
                fallback = Some(path);
            }
        }
    }
    fallback
}

/// Runs a located job script with the job environment.
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    /// Execute `script` from `cwd` with `env`, streaming output as it
    /// arrives, and return the process exit code.
    async fn run(
        &self,
        label: &str,
        script: &Path,
        cwd: &Path,
        env: &BTreeMap<String, String>,
    ) -> Result<i32, ScriptError>;
}

/// Shell executor: sources the script via `sh -c`, mirroring stdout and
/// stderr line-by-line into the log as they arrive.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellExecutor;

impl ShellExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ScriptExecutor for ShellExecutor {
    async fn run(
        &self,
        label: &str,
        script: &Path,
        cwd: &Path,
        env: &BTreeMap<String, String>,
    ) -> Result<i32, ScriptError> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(format!(". '{}'", script.display()))
            .current_dir(cwd)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|source| ScriptError::Spawn { script: script.to_path_buf(), source })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let out_label = label.to_string();
        let err_label = label.to_string();
        let out_task = tokio::spawn(async move {
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::info!(id = %out_label, stream = "stdout", "{line}");
                }
            }
        });
        let err_task = tokio::spawn(async move {
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::info!(id = %err_label, stream = "stderr", "{line}");
                }
            }
        });

        // kill_on_drop reaps the child if the script overruns.
        let status = match tokio::time::timeout(JOB_SCRIPT_TIMEOUT, child.wait()).await {
            Ok(result) => result
                .map_err(|source| ScriptError::Spawn { script: script.to_path_buf(), source })?,
            Err(_) => {
                return Err(SubprocessError::Timeout {
                    label: label.to_string(),
                    timeout: JOB_SCRIPT_TIMEOUT,
                }
                .into())
            }
        };
        let _ = out_task.await;
        let _ = err_task.await;

        status.code().ok_or_else(|| ScriptError::NoExitCode { script: script.to_path_buf() })
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{ScriptError, ScriptExecutor};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    /// Recorded script invocation.
    #[derive(Debug, Clone)]
    pub struct ScriptCall {
        pub label: String,
        pub script: PathBuf,
        pub cwd: PathBuf,
        pub env: BTreeMap<String, String>,
    }

    #[derive(Default)]
    struct FakeExecutorState {
        calls: Vec<ScriptCall>,
        exit_codes: BTreeMap<String, i32>,
    }

    /// Fake executor: records invocations and returns configured exit
    /// codes (default 0) keyed by script file name.
    #[derive(Clone, Default)]
    pub struct FakeExecutor {
        inner: Arc<Mutex<FakeExecutorState>>,
    }

    impl FakeExecutor {
        pub fn new() -> Self {
            Self::default()
        }

        /// Configure the exit code returned for a script file name.
        pub fn set_exit_code(&self, script_name: impl Into<String>, code: i32) {
            self.inner.lock().exit_codes.insert(script_name.into(), code);
        }

        /// All recorded invocations, in order.
        pub fn calls(&self) -> Vec<ScriptCall> {
            self.inner.lock().calls.clone()
        }
    }

    #[async_trait]
    impl ScriptExecutor for FakeExecutor {
        async fn run(
            &self,
            label: &str,
            script: &Path,
            cwd: &Path,
            env: &BTreeMap<String, String>,
        ) -> Result<i32, ScriptError> {
            let mut inner = self.inner.lock();
            inner.calls.push(ScriptCall {
                label: label.to_string(),
                script: script.to_path_buf(),
                cwd: cwd.to_path_buf(),
                env: env.clone(),
            });
            let name = script.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            Ok(inner.exit_codes.get(name).copied().unwrap_or(0))
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeExecutor, ScriptCall};

#[cfg(test)]
#[path = "script_tests.rs"]
mod tests;
