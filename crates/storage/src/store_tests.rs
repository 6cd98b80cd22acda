// SPDX-License-Identifier: MIT

use super::*;
use dmakr_core::{CommitInfo, JobKind, MirrorId, GUARD_ID};

fn guard() -> MirrorId {
    MirrorId::new(GUARD_ID, "/data/.mirrors/jobs")
}

fn watched() -> MirrorId {
    MirrorId::new("watched.lib", "/data/.mirrors/watched/lib")
}

fn open_store(dir: &tempfile::TempDir) -> JobStateStore {
    JobStateStore::open(dir.path().join("dmakr.db.json")).unwrap()
}

fn modify(git_id: MirrorId, commit: &str, branch: &str, job: JobKind, status: JobStatus) -> ModifyJobState {
    ModifyJobState {
        git_id,
        commit_id: commit.to_string(),
        branch: branch.to_string(),
        job,
        status,
    }
}

#[test]
fn get_returns_empty_doc_for_unknown_commit() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let doc = store.get(GUARD_ID, "nope");
    assert_eq!(doc.commit_id, "nope");
    assert!(doc.jobs.is_empty());
}

#[test]
fn apply_persists_and_notifies_on_change() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let mut notes = store.subscribe();

    let effective = store
        .apply(modify(guard(), "c1", "master", JobKind::PREPARE, JobStatus::Running))
        .unwrap();
    assert!(effective);

    let note = notes.try_recv().unwrap();
    assert_eq!(note.trigger.commit_id, "c1");
    assert_eq!(note.state["master"]["prepare"].status, JobStatus::Running);
    assert_eq!(store.get(GUARD_ID, "c1").status("master", JobKind::PREPARE), Some(JobStatus::Running));
}

#[test]
fn duplicate_apply_is_a_no_op_without_notification() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let m = modify(guard(), "c1", "master", JobKind::PREPARE, JobStatus::Running);
    assert!(store.apply(m.clone()).unwrap());

    let mut notes = store.subscribe();
    assert!(!store.apply(m).unwrap());
    assert!(notes.try_recv().is_err());
}

#[test]
fn status_transition_on_same_slot_notifies_again() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    store.apply(modify(guard(), "c1", "master", JobKind::PREPARE, JobStatus::Running)).unwrap();

    let mut notes = store.subscribe();
    assert!(store
        .apply(modify(guard(), "c1", "master", JobKind::PREPARE, JobStatus::Finished))
        .unwrap());
    let note = notes.try_recv().unwrap();
    assert_eq!(note.trigger.status, JobStatus::Finished);
    assert_eq!(note.state["master"]["prepare"].status, JobStatus::Finished);
}

#[test]
fn writes_to_other_slots_preserve_existing_entries() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    store.apply(modify(guard(), "c1", "master", JobKind::PREPARE, JobStatus::Finished)).unwrap();
    store.apply(modify(guard(), "c1", "master", JobKind::AUTOMATIC, JobStatus::Running)).unwrap();
    store.apply(modify(guard(), "c1", "feature/x", JobKind::PREPARE, JobStatus::Running)).unwrap();

    let doc = store.get(GUARD_ID, "c1");
    assert_eq!(doc.status("master", JobKind::PREPARE), Some(JobStatus::Finished));
    assert_eq!(doc.status("master", JobKind::AUTOMATIC), Some(JobStatus::Running));
    assert_eq!(doc.status("feature/x", JobKind::PREPARE), Some(JobStatus::Running));
}

#[test]
fn state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = open_store(&dir);
        store.apply(modify(guard(), "c1", "master", JobKind::PREPARE, JobStatus::Finished)).unwrap();
    }
    let store = open_store(&dir);
    assert_eq!(store.get(GUARD_ID, "c1").status("master", JobKind::PREPARE), Some(JobStatus::Finished));
}

fn indirect_event() -> JobEvent {
    let parent = JobEvent::new(JobKind::PREPARE, guard(), CommitInfo::new("master", "g1"));
    JobEvent::new(JobKind::indirect_prepare(), watched(), CommitInfo::new("main", "w1"))
        .with_parent(parent)
}

#[test]
fn register_indirect_records_fan_out_on_the_parent_commit() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    store.register_indirect(&indirect_event(), "/ws/lib", 2).unwrap();

    let doc = store.get(GUARD_ID, "g1");
    let runners = doc.indirectly_runner.unwrap();
    let record = &runners["master"]["prepare"]["watched.lib"];
    assert_eq!(record.status, JobStatus::Running);
    assert_eq!(record.count, 2);
    assert_eq!(record.kind, JobKind::indirect_prepare());
    assert_eq!(record.workspace, "/ws/lib");
    assert_eq!(record.commit_id, "w1");
    assert_eq!(record.branch, "main");
}

#[test]
fn finish_indirect_flips_only_the_status() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let event = indirect_event();
    store.register_indirect(&event, "/ws/lib", 2).unwrap();
    store.finish_indirect(&event).unwrap();

    let doc = store.get(GUARD_ID, "g1");
    let record = &doc.indirectly_runner.unwrap()["master"]["prepare"]["watched.lib"];
    assert_eq!(record.status, JobStatus::Finished);
    assert_eq!(record.workspace, "/ws/lib");
    assert_eq!(record.count, 2);
}

#[test]
fn finish_indirect_without_registration_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    store.finish_indirect(&indirect_event()).unwrap();
    assert!(store.get(GUARD_ID, "g1").indirectly_runner.is_none());
}

#[test]
fn indirect_bookkeeping_requires_a_parent() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let orphan = JobEvent::new(JobKind::indirect_prepare(), watched(), CommitInfo::new("main", "w1"));
    assert!(matches!(
        store.register_indirect(&orphan, "/ws", 1),
        Err(StoreError::MissingParent(_))
    ));
}

#[test]
fn register_indirect_does_not_notify() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let mut notes = store.subscribe();
    store.register_indirect(&indirect_event(), "/ws/lib", 2).unwrap();
    assert!(notes.try_recv().is_err());
}
