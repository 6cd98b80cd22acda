// SPDX-License-Identifier: MIT

//! The job state store: idempotent status writes with change
//! notification.

use crate::db::{DocMap, JsonDb};
use crate::doc::{fingerprint, merge_status, IndirectRecord, PersistedJobDoc};
use dmakr_core::{JobEvent, JobStateChanged, JobStatus, ModifyJobState};
use parking_lot::Mutex;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::broadcast;

/// Capacity of the notification bus. Policies consume notifications
/// promptly; lagging this far behind is an orchestration bug.
const NOTIFY_CAPACITY: usize = 256;

/// Errors from job state persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job state io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("job state serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("indirect bookkeeping for {0} requires a parent event")]
    MissingParent(String),
}

struct Inner {
    docs: DocMap,
    db: JsonDb,
}

/// Per-commit job state, shared across all runner pipelines.
///
/// All read-modify-write cycles run inside one critical section, which
/// satisfies the per-key serialization requirement: concurrent writers
/// to the same `(repository, commit)` key can never lose an update.
pub struct JobStateStore {
    inner: Mutex<Inner>,
    notify: broadcast::Sender<JobStateChanged>,
}

impl JobStateStore {
    /// Open the store, loading any existing state file.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let db = JsonDb::new(path);
        let docs = db.load()?;
        let (notify, _) = broadcast::channel(NOTIFY_CAPACITY);
        Ok(Self { inner: Mutex::new(Inner { docs, db }), notify })
    }

    /// Subscribe to effective state changes.
    pub fn subscribe(&self) -> broadcast::Receiver<JobStateChanged> {
        self.notify.subscribe()
    }

    /// Current document for a `(repository, commit)` pair; absent
    /// documents read as an empty record, never as a miss.
    pub fn get(&self, repo_id: &str, commit_id: &str) -> PersistedJobDoc {
        self.inner
            .lock()
            .docs
            .get(repo_id)
            .and_then(|commits| commits.get(commit_id))
            .cloned()
            .unwrap_or_else(|| PersistedJobDoc::empty(commit_id))
    }

    /// Apply a status transition.
    ///
    /// The single-entry patch is merged into the commit's jobs map; if
    /// the merged map fingerprints identically to the old one the write
    /// is a no-op — nothing is persisted and nothing is notified.
    /// Returns whether the write was effective.
    pub fn apply(&self, modify: ModifyJobState) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        let doc = inner
            .docs
            .get(&modify.git_id.id)
            .and_then(|commits| commits.get(&modify.commit_id))
            .cloned()
            .unwrap_or_else(|| PersistedJobDoc::empty(&modify.commit_id));

        let old = fingerprint(&doc.jobs);
        let mut merged = doc;
        merge_status(&mut merged.jobs, &modify.branch, modify.job, modify.status);
        if fingerprint(&merged.jobs) == old {
            tracing::debug!(
                repo = %modify.git_id.id,
                commit = %modify.commit_id,
                branch = %modify.branch,
                job = %modify.job,
                status = %modify.status,
                "job state unchanged, skipping write"
            );
            return Ok(false);
        }

        let state = merged.jobs.clone();
        inner
            .docs
            .entry(modify.git_id.id.clone())
            .or_default()
            .insert(modify.commit_id.clone(), merged);
        let snapshot = inner.docs.clone();
        inner.db.save(&snapshot)?;
        drop(inner);

        tracing::info!(
            repo = %modify.git_id.id,
            commit = %modify.commit_id,
            branch = %modify.branch,
            job = %modify.job,
            status = %modify.status,
            "job state changed"
        );
        // No receivers is fine: notifications are best-effort fan-out.
        let _ = self.notify.send(JobStateChanged { trigger: modify, state });
        Ok(true)
    }

    /// Record an indirectly-triggered child run on the parent commit's
    /// document. `watched_count` is the number of watched repositories
    /// registered as children of the parent trigger at this moment;
    /// it is bookkeeping only and never aggregated.
    pub fn register_indirect(
        &self,
        event: &JobEvent,
        workspace: &str,
        watched_count: usize,
    ) -> Result<(), StoreError> {
        let parent = event
            .parent
            .as_deref()
            .ok_or_else(|| StoreError::MissingParent(event.git_id.id.clone()))?;
        let record = IndirectRecord {
            status: JobStatus::Running,
            count: watched_count,
            kind: event.kind,
            workspace: workspace.to_string(),
            commit_id: event.commit.commit_id.clone(),
            branch: event.commit.branch.clone(),
        };

        let mut inner = self.inner.lock();
        let doc = inner
            .docs
            .entry(parent.git_id.id.clone())
            .or_default()
            .entry(parent.commit.commit_id.clone())
            .or_insert_with(|| PersistedJobDoc::empty(&parent.commit.commit_id));
        doc.indirectly_runner
            .get_or_insert_with(Default::default)
            .entry(parent.commit.branch.clone())
            .or_default()
            .entry(parent.kind.to_string())
            .or_default()
            .insert(event.git_id.id.clone(), record);
        let snapshot = inner.docs.clone();
        inner.db.save(&snapshot)
    }

    /// Mark an indirect fan-out record finished. Unknown records are
    /// ignored: finishing is only meaningful after registration.
    pub fn finish_indirect(&self, event: &JobEvent) -> Result<(), StoreError> {
        let parent = event
            .parent
            .as_deref()
            .ok_or_else(|| StoreError::MissingParent(event.git_id.id.clone()))?;

        let mut inner = self.inner.lock();
        let record = inner
            .docs
            .get_mut(&parent.git_id.id)
            .and_then(|commits| commits.get_mut(&parent.commit.commit_id))
            .and_then(|doc| doc.indirectly_runner.as_mut())
            .and_then(|runners| runners.get_mut(&parent.commit.branch))
            .and_then(|kinds| kinds.get_mut(&parent.kind.to_string()))
            .and_then(|children| children.get_mut(&event.git_id.id));
        match record {
            Some(record) => {
                record.status = JobStatus::Finished;
                let snapshot = inner.docs.clone();
                inner.db.save(&snapshot)
            }
            None => {
                tracing::warn!(
                    repo = %event.git_id.id,
                    parent = %parent.git_id.id,
                    commit = %parent.commit.commit_id,
                    "no indirect record to finish"
                );
                Ok(())
            }
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
