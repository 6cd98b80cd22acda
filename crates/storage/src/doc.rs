// SPDX-License-Identifier: MIT

//! Durable per-commit documents and the merge/fingerprint primitives
//! that make state writes idempotent.

use dmakr_core::{JobKind, JobRecord, JobStatus, JobsMap};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Fan-out bookkeeping for one indirectly-triggered child repository.
///
/// `count` records how many watched repositories were registered as
/// children of the parent trigger at registration time. No aggregation
/// over it is performed anywhere; the field exists for compatibility
/// with the persisted format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndirectRecord {
    pub status: JobStatus,
    pub count: usize,
    #[serde(rename = "type")]
    pub kind: JobKind,
    #[serde(rename = "ws")]
    pub workspace: String,
    #[serde(rename = "commitId")]
    pub commit_id: String,
    pub branch: String,
}

/// Indirect fan-out records: parent branch → parent job kind → child
/// repository id → record.
pub type IndirectMap = BTreeMap<String, BTreeMap<String, BTreeMap<String, IndirectRecord>>>;

/// Durable record for one `(repository, commit)` pair. Created on the
/// first write for a commit; the jobs map only grows by key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedJobDoc {
    #[serde(rename = "commitId")]
    pub commit_id: String,
    #[serde(default)]
    pub jobs: JobsMap,
    #[serde(
        rename = "indirectlyRunner",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub indirectly_runner: Option<IndirectMap>,
}

impl PersistedJobDoc {
    /// Fresh document for a commit with no recorded jobs.
    pub fn empty(commit_id: impl Into<String>) -> Self {
        Self { commit_id: commit_id.into(), jobs: JobsMap::new(), indirectly_runner: None }
    }

    /// Status recorded for a `(branch, kind)` slot, if any.
    pub fn status(&self, branch: &str, kind: JobKind) -> Option<JobStatus> {
        self.jobs.get(branch).and_then(|jobs| jobs.get(&kind.to_string())).map(|r| r.status)
    }

    /// Whether any entry of the given kind exists for the branch,
    /// regardless of status.
    pub fn has_job(&self, branch: &str, kind: JobKind) -> bool {
        self.status(branch, kind).is_some()
    }
}

/// Merge a single `(branch, kind) = status` patch into a jobs map.
///
/// Nested-key union: the patched leaf wins, every other path is
/// preserved. Entries are never removed.
pub fn merge_status(jobs: &mut JobsMap, branch: &str, kind: JobKind, status: JobStatus) {
    jobs.entry(branch.to_string())
        .or_default()
        .insert(kind.to_string(), JobRecord { status });
}

/// Deterministic content fingerprint of a jobs map.
///
/// `JobsMap` is ordered, so its canonical JSON form is stable and the
/// digest doubles as a deep-equality check.
pub fn fingerprint(jobs: &JobsMap) -> [u8; 32] {
    let mut hasher = Sha256::new();
    // Serializing a BTreeMap of plain data cannot fail.
    let bytes = serde_json::to_vec(jobs).unwrap_or_default();
    hasher.update(&bytes);
    hasher.finalize().into()
}

#[cfg(test)]
#[path = "doc_tests.rs"]
mod tests;
