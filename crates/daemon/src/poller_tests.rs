// SPDX-License-Identifier: MIT

use super::*;
use async_trait::async_trait;
use dmakr_adapters::GitError;
use dmakr_core::{BranchHeads, CommitInfo};
use parking_lot::Mutex;

/// Snapshot source that errors a configured number of times first.
struct FlakySource {
    failures_left: Mutex<u32>,
}

#[async_trait]
impl SnapshotSource for FlakySource {
    async fn refresh(&self, git_id: &MirrorId) -> Result<BranchHeads, GitError> {
        let mut left = self.failures_left.lock();
        if *left > 0 {
            *left -= 1;
            return Err(GitError::UnknownMirror(git_id.id.clone()));
        }
        Ok(BranchHeads::new(git_id.clone(), vec![CommitInfo::new("master", "c1")]))
    }
}

fn mirror() -> MirrorId {
    MirrorId::new("guard.jobs", "/data/.mirrors/jobs")
}

#[tokio::test]
async fn publishes_snapshots_on_every_tick() {
    let hub = HeadsHub::new();
    let mut rx = hub.subscribe();
    let cancel = CancellationToken::new();
    let source = Arc::new(FlakySource { failures_left: Mutex::new(0) });

    let task = tokio::spawn(poll_mirror(
        source,
        hub.clone(),
        mirror(),
        Duration::from_millis(10),
        cancel.clone(),
    ));

    let first = rx.recv().await.unwrap();
    assert_eq!(first.git_id.id, "guard.jobs");
    let second = rx.recv().await.unwrap();
    assert_eq!(second.heads[0].commit_id, "c1");

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn refresh_failures_are_retried_not_fatal() {
    let hub = HeadsHub::new();
    let mut rx = hub.subscribe();
    let cancel = CancellationToken::new();
    let source = Arc::new(FlakySource { failures_left: Mutex::new(2) });

    let task = tokio::spawn(poll_mirror(
        source,
        hub.clone(),
        mirror(),
        Duration::from_millis(10),
        cancel.clone(),
    ));

    // Nothing published for the failed ticks, then recovery.
    let recovered = rx.recv().await.unwrap();
    assert_eq!(recovered.heads.len(), 1);

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn cancellation_stops_the_poller() {
    let hub = HeadsHub::new();
    let cancel = CancellationToken::new();
    let source = Arc::new(FlakySource { failures_left: Mutex::new(0) });

    let task = tokio::spawn(poll_mirror(
        source,
        hub.clone(),
        mirror(),
        Duration::from_secs(3600),
        cancel.clone(),
    ));

    cancel.cancel();
    task.await.unwrap();
}
