// SPDX-License-Identifier: MIT

//! Diff engine: folds successive branch-head snapshots into ordered
//! change/removal events.
//!
//! The fold is seeded with an empty snapshot, so the first observation
//! after startup produces a `changed` event for every filtered branch
//! (catch-up). Idempotence against re-triggering is the job state
//! store's responsibility, not the diff engine's.

use crate::mirror::{BranchHeads, CommitInfo, MirrorId};
use serde::{Deserialize, Serialize};

/// What happened to a branch between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Branch is new or its head content differs from the previous snapshot.
    Changed,
    /// Branch was present in the previous snapshot and is now gone.
    Removed,
}

crate::simple_display! {
    ChangeKind {
        Changed => "changed",
        Removed => "removed",
    }
}

/// One change record produced by the diff fold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "gitId")]
    pub git_id: MirrorId,
    pub commit: CommitInfo,
    #[serde(rename = "type")]
    pub kind: ChangeKind,
}

/// Keep only heads whose branch name starts with one of the filter
/// prefixes. Filter order carries no priority, just membership.
pub fn filter_heads(heads: &BranchHeads, branch_filter: &[String]) -> BranchHeads {
    BranchHeads {
        git_id: heads.git_id.clone(),
        heads: heads
            .heads
            .iter()
            .filter(|head| branch_filter.iter().any(|prefix| head.branch.starts_with(prefix)))
            .cloned()
            .collect(),
    }
}

/// Per-repository diff fold over filtered snapshots.
#[derive(Debug)]
pub struct MirrorDiff {
    branch_filter: Vec<String>,
    previous: Vec<CommitInfo>,
}

impl MirrorDiff {
    pub fn new(branch_filter: Vec<String>) -> Self {
        Self { branch_filter, previous: Vec::new() }
    }

    /// Fold in the next raw snapshot and return the resulting events:
    /// `changed` in new-snapshot head order, then `removed` in
    /// previous-snapshot head order. An empty comparison yields an
    /// empty vec (no silent empty batches are emitted downstream).
    pub fn observe(&mut self, snapshot: &BranchHeads) -> Vec<ChangeEvent> {
        let filtered = filter_heads(snapshot, &self.branch_filter);

        let mut events = Vec::new();
        for head in &filtered.heads {
            let prior = self.previous.iter().find(|p| p.branch == head.branch);
            if prior != Some(head) {
                events.push(ChangeEvent {
                    git_id: filtered.git_id.clone(),
                    commit: head.clone(),
                    kind: ChangeKind::Changed,
                });
            }
        }
        for prior in &self.previous {
            if filtered.head(&prior.branch).is_none() {
                events.push(ChangeEvent {
                    git_id: filtered.git_id.clone(),
                    commit: prior.clone(),
                    kind: ChangeKind::Removed,
                });
            }
        }

        self.previous = filtered.heads;
        events
    }
}

#[cfg(test)]
#[path = "diff_tests.rs"]
mod tests;
