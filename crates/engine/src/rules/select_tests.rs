// SPDX-License-Identifier: MIT

use super::*;
use dmakr_core::MirrorId;

fn heads(branches: &[&str]) -> BranchHeads {
    BranchHeads {
        git_id: MirrorId::new("guard.jobs", "file:///srv/jobs"),
        heads: branches.iter().map(|b| CommitInfo::new(*b, format!("c-{b}"))).collect(),
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn trigger_branch_comes_first() {
    let priority = branch_priority("feature/x", &strings(&["main", "master"]));
    assert_eq!(priority, strings(&["feature/x", "main", "master"]));
}

#[test]
fn duplicate_trigger_branch_is_not_repeated() {
    let priority = branch_priority("main", &strings(&["main", "master"]));
    assert_eq!(priority, strings(&["main", "master"]));
}

#[test]
fn selects_the_trigger_branch_when_present() {
    let heads = heads(&["master", "feature/x"]);
    let priority = branch_priority("feature/x", &strings(&["main", "master"]));
    assert_eq!(select_head(&heads, &priority).unwrap().branch, "feature/x");
}

#[test]
fn falls_back_in_priority_order() {
    let heads = heads(&["master", "main"]);
    let priority = branch_priority("feature/x", &strings(&["main", "master"]));
    assert_eq!(select_head(&heads, &priority).unwrap().branch, "main");
}

#[test]
fn no_matching_branch_selects_nothing() {
    let heads = heads(&["develop"]);
    let priority = branch_priority("feature/x", &strings(&["main", "master"]));
    assert!(select_head(&heads, &priority).is_none());
}
