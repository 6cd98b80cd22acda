// SPDX-License-Identifier: MIT

//! Branch-priority head selection shared by the forward and indirect
//! policies.

use dmakr_core::{BranchHeads, CommitInfo};

/// Priority list for head selection: the trigger's branch first, then
/// the configured fallback branches in order, duplicates dropped.
pub fn branch_priority(trigger_branch: &str, defaults: &[String]) -> Vec<String> {
    let mut priority = vec![trigger_branch.to_string()];
    for branch in defaults {
        if !priority.contains(branch) {
            priority.push(branch.clone());
        }
    }
    priority
}

/// First head of `heads` whose branch appears in `priority`, taken in
/// priority order. `None` when no listed branch has a head.
pub fn select_head<'a>(heads: &'a BranchHeads, priority: &[String]) -> Option<&'a CommitInfo> {
    priority.iter().find_map(|branch| heads.head(branch))
}

#[cfg(test)]
#[path = "select_tests.rs"]
mod tests;
