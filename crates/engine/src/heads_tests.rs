// SPDX-License-Identifier: MIT

use super::*;
use dmakr_core::{CommitInfo, MirrorId, GUARD_ID};

fn snapshot(repo_id: &str, commit_id: &str) -> BranchHeads {
    BranchHeads {
        git_id: MirrorId { id: repo_id.to_string(), url: format!("file:///srv/{repo_id}") },
        heads: vec![CommitInfo::new("master", commit_id)],
    }
}

#[test]
fn latest_is_none_before_the_first_publish() {
    let hub = HeadsHub::new();
    assert!(hub.latest(GUARD_ID).is_none());
}

#[test]
fn publish_overwrites_the_latest_snapshot() {
    let hub = HeadsHub::new();
    hub.publish(snapshot(GUARD_ID, "c1"));
    hub.publish(snapshot(GUARD_ID, "c2"));
    let latest = hub.latest(GUARD_ID).unwrap();
    assert_eq!(latest.heads[0].commit_id, "c2");
}

#[test]
fn snapshots_are_tracked_per_repository() {
    let hub = HeadsHub::new();
    hub.publish(snapshot(GUARD_ID, "c1"));
    hub.publish(snapshot("watched.lib", "w1"));
    assert_eq!(hub.latest(GUARD_ID).unwrap().heads[0].commit_id, "c1");
    assert_eq!(hub.latest("watched.lib").unwrap().heads[0].commit_id, "w1");
}

#[tokio::test]
async fn subscribers_see_published_snapshots() {
    let hub = HeadsHub::new();
    let mut rx = hub.subscribe();
    hub.publish(snapshot(GUARD_ID, "c1"));
    let seen = rx.recv().await.unwrap();
    assert_eq!(seen.git_id.id, GUARD_ID);
}

#[test]
fn publishing_without_subscribers_does_not_fail() {
    let hub = HeadsHub::new();
    hub.publish(snapshot(GUARD_ID, "c1"));
    assert!(hub.latest(GUARD_ID).is_some());
}
