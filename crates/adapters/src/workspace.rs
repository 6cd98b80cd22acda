// SPDX-License-Identifier: MIT

//! Workspace checkout: a filesystem tree holding one exact commit.

use crate::subprocess::{run_with_timeout, SubprocessError, GIT_COMMAND_TIMEOUT};
use async_trait::async_trait;
use dmakr_core::JobEvent;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;

/// Errors from workspace provisioning.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error(transparent)]
    Subprocess(#[from] SubprocessError),
    #[error("workspace io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{command} failed in {path}: {stderr}")]
    Command { command: String, path: PathBuf, stderr: String },
}

/// Provides a checked-out workspace for the exact commit of a job event.
#[async_trait]
pub trait WorkspaceProvider: Send + Sync {
    async fn checkout(&self, event: &JobEvent) -> Result<PathBuf, WorkspaceError>;
}

/// Workspaces under `<data>/<repo-id>/<branch>/<commit>`, fetched with
/// depth 1 from the local mirror recorded in the event's `MirrorId`.
pub struct GitWorkspace {
    data_path: PathBuf,
}

impl GitWorkspace {
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        Self { data_path: data_path.into() }
    }

    async fn git(args: &[&str], cwd: &Path, label: &str) -> Result<std::process::Output, WorkspaceError> {
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(cwd).env_remove("GIT_DIR").env_remove("GIT_WORK_TREE");
        Ok(run_with_timeout(cmd, GIT_COMMAND_TIMEOUT, label).await?)
    }

    async fn git_checked(args: &[&str], cwd: &Path, label: &str) -> Result<(), WorkspaceError> {
        let output = Self::git(args, cwd, label).await?;
        if !output.status.success() {
            return Err(WorkspaceError::Command {
                command: label.to_string(),
                path: cwd.to_path_buf(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl WorkspaceProvider for GitWorkspace {
    async fn checkout(&self, event: &JobEvent) -> Result<PathBuf, WorkspaceError> {
        let ws = self
            .data_path
            .join(&event.git_id.id)
            .join(&event.commit.branch)
            .join(&event.commit.commit_id);
        tokio::fs::create_dir_all(&ws)
            .await
            .map_err(|source| WorkspaceError::Io { path: ws.clone(), source })?;

        // First use of the directory: turn it into a clone of the mirror.
        let is_repo = Self::git(&["rev-parse", "--is-inside-work-tree"], &ws, "git rev-parse")
            .await
            .map(|out| out.status.success())
            .unwrap_or(false);
        if !is_repo {
            Self::git_checked(&["init"], &ws, "git init").await?;
            Self::git_checked(
                &["remote", "add", "origin", &event.git_id.url],
                &ws,
                "git remote add",
            )
            .await?;
        }

        Self::git_checked(
            &["fetch", "--depth", "1", "origin", &event.commit.commit_id],
            &ws,
            "git fetch",
        )
        .await?;
        Self::git_checked(&["checkout", &event.commit.commit_id], &ws, "git checkout").await?;

        tracing::debug!(
            repo = %event.git_id.id,
            commit = %event.commit.commit_id,
            ws = %ws.display(),
            "workspace ready"
        );
        Ok(ws)
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{WorkspaceError, WorkspaceProvider};
    use async_trait::async_trait;
    use dmakr_core::JobEvent;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Arc;

    /// Fake workspace provider: hands out preconfigured directories per
    /// repository role and records every checkout.
    #[derive(Clone, Default)]
    pub struct FakeWorkspace {
        inner: Arc<Mutex<FakeWorkspaceState>>,
    }

    #[derive(Default)]
    struct FakeWorkspaceState {
        roots: HashMap<String, PathBuf>,
        checkouts: Vec<JobEvent>,
    }

    impl FakeWorkspace {
        pub fn new() -> Self {
            Self::default()
        }

        /// Configure the directory returned for a repository role.
        pub fn set_root(&self, repo_id: impl Into<String>, path: impl Into<PathBuf>) {
            self.inner.lock().roots.insert(repo_id.into(), path.into());
        }

        /// Events checked out so far, in order.
        pub fn checkouts(&self) -> Vec<JobEvent> {
            self.inner.lock().checkouts.clone()
        }
    }

    #[async_trait]
    impl WorkspaceProvider for FakeWorkspace {
        async fn checkout(&self, event: &JobEvent) -> Result<PathBuf, WorkspaceError> {
            let mut inner = self.inner.lock();
            inner.checkouts.push(event.clone());
            let root = inner
                .roots
                .get(&event.git_id.id)
                .cloned()
                .unwrap_or_else(|| PathBuf::from("/nonexistent"));
            Ok(root)
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeWorkspace;
