// SPDX-License-Identifier: MIT

//! Mirror identities and branch-head snapshots.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Role id of the guard (jobs) repository.
pub const GUARD_ID: &str = "guard.jobs";

/// Build the role id for a watched repository.
pub fn watched_id(name: &str) -> String {
    format!("watched.{name}")
}

/// Stable identity of a repository role: the role id plus the local
/// mirror location jobs are fetched from. Assigned once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorId {
    /// `guard.jobs` or `watched.<name>`.
    pub id: String,
    /// Local mirror path (used as the fetch remote for workspaces).
    pub url: String,
}

impl MirrorId {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self { id: id.into(), url: url.into() }
    }

    /// Whether this mirror is a watched repository (as opposed to the guard).
    pub fn is_watched(&self) -> bool {
        self.id.starts_with("watched.")
    }
}

/// The full set of tracked repository roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorIds {
    pub guard: MirrorId,
    /// Watched repositories keyed by role id (`watched.<name>`).
    pub watched: HashMap<String, MirrorId>,
}

impl MirrorIds {
    /// Iterate over every tracked role, guard first.
    pub fn iter(&self) -> impl Iterator<Item = &MirrorId> {
        std::iter::once(&self.guard).chain(self.watched.values())
    }
}

/// One branch head as observed in a mirror scan.
///
/// `branch` is unique within a single snapshot. Equality is structural:
/// a changed message or tag set counts as a change even when the commit
/// id is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub branch: String,
    #[serde(rename = "commitId")]
    pub commit_id: String,
    pub message: String,
    pub tags: Vec<String>,
}

impl CommitInfo {
    pub fn new(branch: impl Into<String>, commit_id: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            commit_id: commit_id.into(),
            message: String::new(),
            tags: Vec::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// Snapshot of a repository's branch heads. Head ordering is preserved
/// from the scan and is significant for event ordering downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchHeads {
    #[serde(rename = "gitId")]
    pub git_id: MirrorId,
    pub heads: Vec<CommitInfo>,
}

impl BranchHeads {
    pub fn new(git_id: MirrorId, heads: Vec<CommitInfo>) -> Self {
        Self { git_id, heads }
    }

    /// Look up a head by branch name.
    pub fn head(&self, branch: &str) -> Option<&CommitInfo> {
        self.heads.iter().find(|h| h.branch == branch)
    }
}

#[cfg(test)]
#[path = "mirror_tests.rs"]
mod tests;
