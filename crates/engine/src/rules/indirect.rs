// SPDX-License-Identifier: MIT

//! Indirect-prepare policy: a change anywhere fans out prepare jobs to
//! the watched repositories.

use crate::rules::select::{branch_priority, select_head};
use dmakr_core::{BranchHeads, JobEvent, JobKind};

/// Spawn an indirect prepare job on one watched repository for a change
/// observed elsewhere.
///
/// The watched commit is chosen from `watched_heads` by branch
/// priority: the triggering branch first, then the watched repository's
/// configured fallback branches. The emitted event carries the
/// triggering event as `parent`, which the runner uses for fan-out
/// bookkeeping on the parent commit's document.
pub fn indirect_prepare_event(
    watched_heads: &BranchHeads,
    watched_defaults: &[String],
    parent: &JobEvent,
) -> Option<JobEvent> {
    let priority = branch_priority(&parent.commit.branch, watched_defaults);
    let head = select_head(watched_heads, &priority)?;
    Some(
        JobEvent::new(JobKind::indirect_prepare(), watched_heads.git_id.clone(), head.clone())
            .with_parent(parent.clone()),
    )
}

#[cfg(test)]
#[path = "indirect_tests.rs"]
mod tests;
