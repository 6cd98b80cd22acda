// SPDX-License-Identifier: MIT

//! Pipeline wiring: one task per (policy, repository), each consuming
//! its trigger bus and dispatching job events strictly in order.
//!
//! Dispatch awaits the runner before taking the next trigger, so within
//! a pipeline a new job never starts until the previous one completed.
//! Pipelines for different repositories run concurrently.

use crate::heads::HeadsHub;
use crate::rules;
use crate::runner::{Runner, RunnerError};
use dmakr_adapters::{ScriptExecutor, WorkspaceProvider};
use dmakr_core::{
    ChangeKind, JobEvent, JobKind, JobStatus, MirrorDiff, MirrorIds, RuleOptions,
};
use dmakr_storage::JobStateStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Settle delay between a change batch and its indirect fan-out,
/// letting the direct pipelines write their first statuses.
const INDIRECT_SETTLE: Duration = Duration::from_millis(100);

/// A pipeline failure. Any pipeline error is fatal to the daemon.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Runner(#[from] RunnerError),
}

/// Everything the pipelines read from: shared state plus the static
/// repository roles and their options.
#[derive(Clone)]
pub struct EngineDeps {
    pub store: Arc<JobStateStore>,
    pub heads: HeadsHub,
    pub mirrors: MirrorIds,
    pub rules: RuleOptions,
}

/// Spawn all pipelines: prepare and automatic per repository, one
/// forward pipeline for the guard, one indirect fan-out pipeline.
///
/// The returned set completes when all pipelines have stopped; a task
/// resolving to `Err` means the daemon must shut down.
pub fn spawn_pipelines<W, X>(
    deps: EngineDeps,
    runner: Arc<Runner<W, X>>,
    cancel: CancellationToken,
) -> JoinSet<Result<(), PipelineError>>
where
    W: WorkspaceProvider + 'static,
    X: ScriptExecutor + 'static,
{
    let mut set = JoinSet::new();

    for repo in deps.mirrors.iter() {
        set.spawn(prepare_pipeline(deps.clone(), repo.id.clone(), runner.clone(), cancel.clone()));
        set.spawn(automatic_pipeline(
            deps.clone(),
            repo.id.clone(),
            runner.clone(),
            cancel.clone(),
        ));
    }
    set.spawn(forward_pipeline(deps.clone(), runner.clone(), cancel.clone()));
    set.spawn(indirect_pipeline(deps, runner, cancel));

    set
}

/// Prepare pipeline: folds the repository's head snapshots into change
/// events and spawns direct prepare jobs.
async fn prepare_pipeline<W, X>(
    deps: EngineDeps,
    repo_id: String,
    runner: Arc<Runner<W, X>>,
    cancel: CancellationToken,
) -> Result<(), PipelineError>
where
    W: WorkspaceProvider,
    X: ScriptExecutor,
{
    let mut heads_rx = deps.heads.subscribe();
    let mut diff = MirrorDiff::new(deps.rules.branch_filter(&repo_id));

    loop {
        let snapshot = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            msg = heads_rx.recv() => match msg {
                Ok(snapshot) => snapshot,
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(pipeline = "prepare", repo = %repo_id, missed, "lagged behind the heads bus");
                    continue;
                }
                Err(RecvError::Closed) => return Ok(()),
            },
        };
        if snapshot.git_id.id != repo_id {
            continue;
        }

        for change in diff.observe(&snapshot) {
            let doc = deps.store.get(&repo_id, &change.commit.commit_id);
            match change.kind {
                ChangeKind::Changed => {
                    if let Some(event) = rules::prepare_event(&doc, &change) {
                        runner.dispatch(&event).await?;
                    }
                }
                ChangeKind::Removed => {
                    if rules::removed_needs_repair(&doc, &change) {
                        tracing::info!(
                            repo = %repo_id,
                            branch = %change.commit.branch,
                            commit = %change.commit.commit_id,
                            "branch removed without a prepare record"
                        );
                    } else {
                        tracing::info!(
                            repo = %repo_id,
                            branch = %change.commit.branch,
                            "branch removed"
                        );
                    }
                }
            }
        }
    }
}

/// Automatic pipeline: watches state-change notifications for the
/// repository and promotes finished prepares on current heads.
async fn automatic_pipeline<W, X>(
    deps: EngineDeps,
    repo_id: String,
    runner: Arc<Runner<W, X>>,
    cancel: CancellationToken,
) -> Result<(), PipelineError>
where
    W: WorkspaceProvider,
    X: ScriptExecutor,
{
    let mut notes = deps.store.subscribe();

    loop {
        let note = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            msg = notes.recv() => match msg {
                Ok(note) => note,
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(pipeline = "automatic", repo = %repo_id, missed, "lagged behind state notifications");
                    continue;
                }
                Err(RecvError::Closed) => return Ok(()),
            },
        };
        if note.trigger.git_id.id != repo_id {
            continue;
        }

        // Sampled at trigger time; nothing to promote before the first poll.
        let Some(heads) = deps.heads.latest(&repo_id) else { continue };
        if let Some(event) = rules::automatic_event(&heads, &note) {
            runner.dispatch(&event).await?;
        }
    }
}

/// Forward pipeline: watches for `forward` statuses on watched
/// repositories and delegates the job to the guard repository.
async fn forward_pipeline<W, X>(
    deps: EngineDeps,
    runner: Arc<Runner<W, X>>,
    cancel: CancellationToken,
) -> Result<(), PipelineError>
where
    W: WorkspaceProvider,
    X: ScriptExecutor,
{
    let mut notes = deps.store.subscribe();
    let guard_id = deps.mirrors.guard.id.clone();
    let guard_defaults = deps.rules.default_branch(&guard_id);

    loop {
        let note = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            msg = notes.recv() => match msg {
                Ok(note) => note,
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(pipeline = "forward", missed, "lagged behind state notifications");
                    continue;
                }
                Err(RecvError::Closed) => return Ok(()),
            },
        };
        if note.trigger.status != JobStatus::Forward || !note.trigger.git_id.is_watched() {
            continue;
        }

        let Some(guard_heads) = deps.heads.latest(&guard_id) else {
            tracing::warn!(
                repo = %note.trigger.git_id.id,
                branch = %note.trigger.branch,
                "no guard snapshot yet, dropping forward"
            );
            continue;
        };
        if let Some(event) = rules::forward_event(&guard_heads, &guard_defaults, &note) {
            runner.dispatch(&event).await?;
        }
    }
}

/// Indirect pipeline: folds every repository's snapshots through its
/// own diff and fans each change batch out to the watched repositories
/// after a short settle delay.
async fn indirect_pipeline<W, X>(
    deps: EngineDeps,
    runner: Arc<Runner<W, X>>,
    cancel: CancellationToken,
) -> Result<(), PipelineError>
where
    W: WorkspaceProvider,
    X: ScriptExecutor,
{
    let mut heads_rx = deps.heads.subscribe();
    let mut diffs: HashMap<String, MirrorDiff> = deps
        .mirrors
        .iter()
        .map(|repo| (repo.id.clone(), MirrorDiff::new(deps.rules.branch_filter(&repo.id))))
        .collect();
    // Sorted for a deterministic fan-out order.
    let mut watched_ids: Vec<String> = deps.mirrors.watched.keys().cloned().collect();
    watched_ids.sort();

    loop {
        let snapshot = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            msg = heads_rx.recv() => match msg {
                Ok(snapshot) => snapshot,
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(pipeline = "indirect", missed, "lagged behind the heads bus");
                    continue;
                }
                Err(RecvError::Closed) => return Ok(()),
            },
        };
        let Some(diff) = diffs.get_mut(&snapshot.git_id.id) else { continue };
        let changes: Vec<_> = diff
            .observe(&snapshot)
            .into_iter()
            .filter(|change| change.kind == ChangeKind::Changed)
            .collect();
        if changes.is_empty() {
            continue;
        }

        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(INDIRECT_SETTLE) => {}
        }

        for change in changes {
            let parent = JobEvent::new(JobKind::PREPARE, change.git_id.clone(), change.commit);
            for watched_id in &watched_ids {
                let Some(watched_heads) = deps.heads.latest(watched_id) else { continue };
                let defaults = deps.rules.default_branch(watched_id);
                let Some(event) = rules::indirect_prepare_event(&watched_heads, &defaults, &parent)
                else {
                    continue;
                };
                // One fan-out per (child commit, branch); later changes
                // elsewhere must not re-run a child that already ran.
                let doc = deps.store.get(&event.git_id.id, &event.commit.commit_id);
                if doc.has_job(&event.commit.branch, event.kind) {
                    continue;
                }
                runner.dispatch(&event).await?;
            }
        }
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
