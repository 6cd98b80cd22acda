// SPDX-License-Identifier: MIT

//! Prepare policy: changed branch heads spawn prepare jobs.

use dmakr_core::{ChangeEvent, ChangeKind, JobEvent, JobKind};
use dmakr_storage::PersistedJobDoc;

/// A changed head spawns a prepare job unless the commit already
/// carries a prepare entry for that branch (any status suppresses
/// re-triggering, including `running`).
pub fn prepare_event(doc: &PersistedJobDoc, change: &ChangeEvent) -> Option<JobEvent> {
    if change.kind != ChangeKind::Changed {
        return None;
    }
    if doc.has_job(&change.commit.branch, JobKind::PREPARE) {
        return None;
    }
    Some(JobEvent::new(JobKind::PREPARE, change.git_id.clone(), change.commit.clone()))
}

/// Removed heads never spawn jobs. A removal whose commit has no
/// recorded prepare status is surfaced for external cleanup.
pub fn removed_needs_repair(doc: &PersistedJobDoc, change: &ChangeEvent) -> bool {
    change.kind == ChangeKind::Removed && !doc.has_job(&change.commit.branch, JobKind::PREPARE)
}

#[cfg(test)]
#[path = "prepare_tests.rs"]
mod tests;
