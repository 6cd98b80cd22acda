// SPDX-License-Identifier: MIT

//! Forward policy: a watched repository with no job script delegates
//! execution to the guard repository.

use crate::rules::select::{branch_priority, select_head};
use dmakr_core::{BranchHeads, JobEvent, JobStateChanged, JobStatus};

/// Spawn a guard-side job for a `forward` status written on a watched
/// repository.
///
/// The guard commit is chosen from `guard_heads` by branch priority:
/// the forwarding branch itself first, then the guard's configured
/// fallback branches. The emitted event keeps the trigger's job kind
/// and carries the trigger as `source`, so the runner can route status
/// writes back to the watched repository's slot.
pub fn forward_event(
    guard_heads: &BranchHeads,
    guard_defaults: &[String],
    note: &JobStateChanged,
) -> Option<JobEvent> {
    let trigger = &note.trigger;
    if trigger.status != JobStatus::Forward || !trigger.git_id.is_watched() {
        return None;
    }
    let priority = branch_priority(&trigger.branch, guard_defaults);
    let head = select_head(guard_heads, &priority)?;
    Some(
        JobEvent::new(trigger.job, guard_heads.git_id.clone(), head.clone())
            .with_source(trigger.clone()),
    )
}

#[cfg(test)]
#[path = "forward_tests.rs"]
mod tests;
