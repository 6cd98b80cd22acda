// SPDX-License-Identifier: MIT

//! Automatic policy: a finished prepare-family job promotes its commit
//! to the automatic stage.

use dmakr_core::{BranchHeads, JobEvent, JobKind, JobStateChanged, JobStatus};

/// Spawn an automatic job when a prepare-family job reports `finished`
/// and the finished commit is still the current head of its branch.
///
/// `heads` is the latest snapshot of the repository the notification is
/// about, read at trigger time. A commit that was superseded while its
/// prepare ran is silently dropped, as is a notification whose merged
/// state already carries an automatic entry for the branch.
pub fn automatic_event(heads: &BranchHeads, note: &JobStateChanged) -> Option<JobEvent> {
    let trigger = &note.trigger;
    if trigger.status != JobStatus::Finished || !trigger.job.is_prepare_family() {
        return None;
    }
    let head = heads.head(&trigger.branch).filter(|h| h.commit_id == trigger.commit_id)?;
    let already_automatic = note
        .state
        .get(&trigger.branch)
        .is_some_and(|jobs| jobs.contains_key(&JobKind::AUTOMATIC.to_string()));
    if already_automatic {
        return None;
    }
    Some(JobEvent::new(JobKind::AUTOMATIC, heads.git_id.clone(), head.clone()))
}

#[cfg(test)]
#[path = "automatic_tests.rs"]
mod tests;
