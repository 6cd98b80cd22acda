// SPDX-License-Identifier: MIT

//! The runner adapter: executes one job event against a workspace and
//! writes every lifecycle transition to the job state store.

use dmakr_adapters::{find_job_file, ScriptExecutor, WorkspaceProvider};
use dmakr_core::{JobEvent, JobStatus, ModifyJobState};
use dmakr_storage::{JobStateStore, StoreError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Errors from job execution. Failures of the job itself (checkout,
/// spawn, non-zero exit) are recorded as the job's `error` status and
/// are not errors here; only state persistence can fail the runner.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Executes job events one at a time.
///
/// The runner never decides *whether* to run, only *how*: idempotence
/// lives in the policies and the store. Script exit codes map to
/// `finished`/`error`; a missing script resolves per the event's shape.
pub struct Runner<W, X> {
    store: Arc<JobStateStore>,
    workspaces: W,
    scripts: X,
    /// Number of watched repositories, recorded in fan-out bookkeeping.
    watched_count: usize,
}

impl<W: WorkspaceProvider, X: ScriptExecutor> Runner<W, X> {
    pub fn new(store: Arc<JobStateStore>, workspaces: W, scripts: X, watched_count: usize) -> Self {
        Self { store, workspaces, scripts, watched_count }
    }

    /// Run one job event to completion. Events with a `source` take the
    /// forwarded path, events with a `parent` the indirect path.
    pub async fn dispatch(&self, event: &JobEvent) -> Result<(), RunnerError> {
        if let Some(source) = &event.source {
            self.run_forwarded(event, source).await
        } else if let Some(parent) = &event.parent {
            self.run_indirect(event, parent).await
        } else {
            self.run_direct(event).await
        }
    }

    async fn run_direct(&self, event: &JobEvent) -> Result<(), RunnerError> {
        self.store.apply(ModifyJobState::for_event(event, JobStatus::Running))?;
        let Some(ws) = self.checkout(event).await else {
            self.store.apply(ModifyJobState::for_event(event, JobStatus::Error))?;
            return Ok(());
        };

        let Some(script) = find_job_file(&ws, &event.git_id.id, event.kind.base()) else {
            // Watched prepare-family jobs delegate to the guard
            // repository; everything else has nothing left to do.
            let status = if event.git_id.is_watched() && event.kind.is_prepare_family() {
                JobStatus::Forward
            } else {
                JobStatus::FinishedSkipped
            };
            tracing::info!(
                repo = %event.git_id.id,
                branch = %event.commit.branch,
                commit = %event.commit.commit_id,
                job = %event.kind,
                %status,
                "no job script found"
            );
            self.store.apply(ModifyJobState::for_event(event, status))?;
            return Ok(());
        };

        let env = job_env(event);
        let status = self.exec(&event.git_id.id, &script, &ws, &env).await;
        self.store.apply(ModifyJobState::for_event(event, status))?;
        Ok(())
    }

    /// Forwarded path: the workspace is a guard commit, but all status
    /// writes go to the delegating watched repository's slot under the
    /// `:forward`-marked kind.
    async fn run_forwarded(
        &self,
        event: &JobEvent,
        source: &ModifyJobState,
    ) -> Result<(), RunnerError> {
        self.store.apply(forwarded_slot(event, source, JobStatus::Running))?;
        let Some(ws) = self.checkout(event).await else {
            self.store.apply(forwarded_slot(event, source, JobStatus::Error))?;
            return Ok(());
        };

        let Some(script) = find_job_file(&ws, &source.git_id.id, event.kind.base()) else {
            tracing::info!(
                repo = %source.git_id.id,
                branch = %source.branch,
                commit = %source.commit_id,
                job = %event.kind.with_forwarded(),
                "no job script in the guard repository either"
            );
            self.store.apply(forwarded_slot(event, source, JobStatus::FinishedNoJobFile))?;
            return Ok(());
        };

        let mut env = job_env(event);
        env.insert("source.commit".to_string(), source.commit_id.clone());
        env.insert("source.branch".to_string(), source.branch.clone());
        let status = self.exec(&source.git_id.id, &script, &ws, &env).await;
        self.store.apply(forwarded_slot(event, source, status))?;
        Ok(())
    }

    /// Indirect path: marks the parent trigger's slot running, registers
    /// the fan-out record, then runs like a direct job with the
    /// workspace path exported to the script.
    async fn run_indirect(&self, event: &JobEvent, parent: &JobEvent) -> Result<(), RunnerError> {
        self.store.apply(ModifyJobState {
            git_id: parent.git_id.clone(),
            commit_id: parent.commit.commit_id.clone(),
            branch: parent.commit.branch.clone(),
            job: parent.kind,
            status: JobStatus::Running,
        })?;
        self.store.apply(ModifyJobState::for_event(event, JobStatus::Running))?;

        let Some(ws) = self.checkout(event).await else {
            self.store.apply(ModifyJobState::for_event(event, JobStatus::Error))?;
            return Ok(());
        };
        let ws_str = ws.to_string_lossy().to_string();
        self.store.register_indirect(event, &ws_str, self.watched_count)?;

        let Some(script) = find_job_file(&ws, &event.git_id.id, event.kind.base()) else {
            tracing::info!(
                repo = %event.git_id.id,
                branch = %event.commit.branch,
                commit = %event.commit.commit_id,
                job = %event.kind,
                "no job script found, forwarding"
            );
            self.store.apply(ModifyJobState::for_event(event, JobStatus::Forward))?;
            return Ok(());
        };

        let mut env = job_env(event);
        env.insert("ws".to_string(), ws_str);
        let status = self.exec(&event.git_id.id, &script, &ws, &env).await;
        self.store.apply(ModifyJobState::for_event(event, status))?;
        self.store.finish_indirect(event)?;
        Ok(())
    }

    async fn checkout(&self, event: &JobEvent) -> Option<PathBuf> {
        match self.workspaces.checkout(event).await {
            Ok(ws) => Some(ws),
            Err(err) => {
                tracing::warn!(
                    repo = %event.git_id.id,
                    commit = %event.commit.commit_id,
                    error = %err,
                    "workspace checkout failed"
                );
                None
            }
        }
    }

    async fn exec(
        &self,
        label: &str,
        script: &Path,
        cwd: &Path,
        env: &BTreeMap<String, String>,
    ) -> JobStatus {
        match self.scripts.run(label, script, cwd, env).await {
            Ok(0) => JobStatus::Finished,
            Ok(code) => {
                tracing::info!(id = %label, script = %script.display(), code, "job script failed");
                JobStatus::Error
            }
            Err(err) => {
                tracing::warn!(id = %label, script = %script.display(), error = %err, "job script execution failed");
                JobStatus::Error
            }
        }
    }
}

fn forwarded_slot(event: &JobEvent, source: &ModifyJobState, status: JobStatus) -> ModifyJobState {
    ModifyJobState {
        git_id: source.git_id.clone(),
        commit_id: source.commit_id.clone(),
        branch: source.branch.clone(),
        job: event.kind.with_forwarded(),
        status,
    }
}

/// The environment exported to every job script.
fn job_env(event: &JobEvent) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("id".to_string(), event.git_id.id.clone()),
        ("url".to_string(), event.git_id.url.clone()),
        ("branch".to_string(), event.commit.branch.clone()),
        ("commitId".to_string(), event.commit.commit_id.clone()),
        ("message".to_string(), event.commit.message.clone()),
        ("tags".to_string(), event.commit.tags.join(",")),
    ])
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
