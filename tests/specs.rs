// SPDX-License-Identifier: MIT

//! Workspace-level scenarios: full pipeline loops over fake workspace
//! and script adapters.

use dmakr_adapters::{FakeExecutor, FakeWorkspace};
use dmakr_core::{
    BranchHeads, CommitInfo, JobKind, JobStatus, MirrorId, MirrorIds, RepoOptions, RuleOptions,
    GUARD_ID,
};
use dmakr_engine::{spawn_pipelines, EngineDeps, HeadsHub, PipelineError, Runner};
use dmakr_storage::JobStateStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

struct Harness {
    _dir: tempfile::TempDir,
    store: Arc<JobStateStore>,
    heads: HeadsHub,
    workspaces: FakeWorkspace,
    scripts: FakeExecutor,
    mirrors: MirrorIds,
    rules: RuleOptions,
}

impl Harness {
    fn new(watched: &[&str], branch_filter: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JobStateStore::open(dir.path().join("dmakr.db.json")).unwrap());

        let filter: Vec<String> = branch_filter.iter().map(|s| s.to_string()).collect();
        let options = |is_guard: bool| RepoOptions {
            branch_filter: filter.clone(),
            ..RepoOptions::defaults(is_guard)
        };

        let mut rules = RuleOptions::default();
        rules.insert(GUARD_ID, options(true));
        let mut watched_map = HashMap::new();
        for id in watched {
            watched_map.insert(id.to_string(), MirrorId::new(*id, format!("file:///srv/{id}")));
            rules.insert(*id, options(false));
        }

        Self {
            _dir: dir,
            store,
            heads: HeadsHub::new(),
            workspaces: FakeWorkspace::new(),
            scripts: FakeExecutor::new(),
            mirrors: MirrorIds {
                guard: MirrorId::new(GUARD_ID, "file:///srv/jobs"),
                watched: watched_map,
            },
            rules,
        }
    }

    fn workspace_with(&self, repo_id: &str, scripts: &[&str]) {
        let root = self._dir.path().join("ws").join(repo_id);
        std::fs::create_dir_all(&root).unwrap();
        for name in scripts {
            std::fs::write(root.join(name), "exit 0\n").unwrap();
        }
        self.workspaces.set_root(repo_id, root);
    }

    fn spawn(&self, cancel: &CancellationToken) -> JoinSet<Result<(), PipelineError>> {
        let runner = Arc::new(Runner::new(
            self.store.clone(),
            self.workspaces.clone(),
            self.scripts.clone(),
            self.mirrors.watched.len(),
        ));
        let deps = EngineDeps {
            store: self.store.clone(),
            heads: self.heads.clone(),
            mirrors: self.mirrors.clone(),
            rules: self.rules.clone(),
        };
        spawn_pipelines(deps, runner, cancel.clone())
    }

    fn publish(&self, repo_id: &str, heads: Vec<CommitInfo>) {
        let url = format!("file:///srv/{repo_id}");
        self.heads.publish(BranchHeads { git_id: MirrorId::new(repo_id, url), heads });
    }

    fn status(&self, repo_id: &str, commit: &str, branch: &str, kind: JobKind) -> Option<JobStatus> {
        self.store.get(repo_id, commit).status(branch, kind)
    }
}

/// Give the freshly spawned pipeline tasks a chance to subscribe to the
/// (lossy) heads bus before the test publishes its one-shot snapshots.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..250 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached within 5s");
}

async fn shutdown(cancel: CancellationToken, mut set: JoinSet<Result<(), PipelineError>>) {
    cancel.cancel();
    while let Some(result) = set.join_next().await {
        result.unwrap().unwrap();
    }
}

/// Two filtered branches catch up on the first snapshot, run their
/// prepare jobs in head order, and each finished prepare promotes to
/// exactly one automatic job while the heads stay unchanged.
#[tokio::test]
async fn guard_catch_up_runs_prepare_then_automatic_per_branch() {
    let harness = Harness::new(&[], &["master", "main", "feature/"]);
    harness.workspace_with(GUARD_ID, &["dmakr.prepare.sh", "dmakr.automatic.sh"]);

    let cancel = CancellationToken::new();
    let set = harness.spawn(&cancel);
    settle().await;

    harness.publish(
        GUARD_ID,
        vec![
            CommitInfo::new("master", "c1").with_tags(vec!["0.0.1".to_string()]),
            CommitInfo::new("feature/foo", "c2"),
        ],
    );

    wait_until(|| {
        harness.status(GUARD_ID, "c1", "master", JobKind::AUTOMATIC) == Some(JobStatus::Finished)
            && harness.status(GUARD_ID, "c2", "feature/foo", JobKind::AUTOMATIC)
                == Some(JobStatus::Finished)
    })
    .await;

    assert_eq!(
        harness.status(GUARD_ID, "c1", "master", JobKind::PREPARE),
        Some(JobStatus::Finished)
    );
    assert_eq!(
        harness.status(GUARD_ID, "c2", "feature/foo", JobKind::PREPARE),
        Some(JobStatus::Finished)
    );

    // Prepare jobs ran in head order; the commit's tags reached the script.
    let prepares: Vec<_> = harness
        .scripts
        .calls()
        .into_iter()
        .filter(|call| call.script.file_name().unwrap() == "dmakr.prepare.sh")
        .collect();
    assert_eq!(prepares.len(), 2);
    assert_eq!(prepares[0].env["commitId"], "c1");
    assert_eq!(prepares[0].env["tags"], "0.0.1");
    assert_eq!(prepares[1].env["commitId"], "c2");

    // Re-publishing the same snapshot is a full no-op.
    let calls_before = harness.scripts.calls().len();
    harness.publish(
        GUARD_ID,
        vec![
            CommitInfo::new("master", "c1").with_tags(vec!["0.0.1".to_string()]),
            CommitInfo::new("feature/foo", "c2"),
        ],
    );
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(harness.scripts.calls().len(), calls_before);

    shutdown(cancel, set).await;
}

/// A watched repository with no prepare script delegates to the guard:
/// the runner writes `forward`, the forward policy picks the guard's
/// `master` head, and the delegated run reports back onto the watched
/// repository's `prepare:forward` slot.
#[tokio::test]
async fn watched_repo_without_script_delegates_to_the_guard() {
    let harness = Harness::new(&["watched.lib"], &["master"]);
    harness.workspace_with(GUARD_ID, &["watched.lib.prepare.sh"]);
    harness.workspace_with("watched.lib", &[]);

    let cancel = CancellationToken::new();
    let set = harness.spawn(&cancel);
    settle().await;

    harness.publish(GUARD_ID, vec![CommitInfo::new("master", "g1")]);
    harness.publish("watched.lib", vec![CommitInfo::new("master", "w1")]);

    let forwarded = JobKind::PREPARE.with_forwarded();
    wait_until(|| {
        harness.status("watched.lib", "w1", "master", forwarded) == Some(JobStatus::Finished)
    })
    .await;

    assert_eq!(
        harness.status("watched.lib", "w1", "master", JobKind::PREPARE),
        Some(JobStatus::Forward)
    );

    let delegated = harness
        .scripts
        .calls()
        .into_iter()
        .find(|call| call.script.file_name().unwrap() == "watched.lib.prepare.sh")
        .unwrap();
    assert_eq!(delegated.label, "watched.lib");
    assert_eq!(delegated.env["commitId"], "g1");
    assert_eq!(delegated.env["source.commit"], "w1");
    assert_eq!(delegated.env["source.branch"], "master");

    shutdown(cancel, set).await;
}

/// Persisted state survives a restart: a restarted engine seeing the
/// same heads does not re-run anything.
#[tokio::test]
async fn restart_with_same_heads_triggers_nothing() {
    let harness = Harness::new(&[], &["master"]);
    harness.workspace_with(GUARD_ID, &["dmakr.prepare.sh"]);

    let cancel = CancellationToken::new();
    let set = harness.spawn(&cancel);
    settle().await;
    harness.publish(GUARD_ID, vec![CommitInfo::new("master", "c1")]);
    wait_until(|| {
        harness.status(GUARD_ID, "c1", "master", JobKind::PREPARE) == Some(JobStatus::Finished)
    })
    .await;
    shutdown(cancel, set).await;

    // Fresh pipelines against the same store: the catch-up change event
    // fires again, but the prepare policy sees the persisted record.
    let calls_before = harness.scripts.calls().len();
    let cancel = CancellationToken::new();
    let set = harness.spawn(&cancel);
    settle().await;
    harness.publish(GUARD_ID, vec![CommitInfo::new("master", "c1")]);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(harness.scripts.calls().len(), calls_before);

    shutdown(cancel, set).await;
}
