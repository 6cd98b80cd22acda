// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn guard_is_not_watched() {
    let id = MirrorId::new(GUARD_ID, "/data/.mirrors/jobs");
    assert!(!id.is_watched());
}

#[test]
fn watched_id_prefixes_name() {
    assert_eq!(watched_id("lib"), "watched.lib");
    assert!(MirrorId::new(watched_id("lib"), "/data/.mirrors/watched/lib").is_watched());
}

#[test]
fn mirror_ids_iterates_guard_first() {
    let guard = MirrorId::new(GUARD_ID, "/g");
    let lib = MirrorId::new("watched.lib", "/w");
    let ids = MirrorIds {
        guard: guard.clone(),
        watched: HashMap::from([("watched.lib".to_string(), lib)]),
    };
    let first = ids.iter().next().unwrap();
    assert_eq!(first, &guard);
    assert_eq!(ids.iter().count(), 2);
}

#[test]
fn head_lookup_by_branch() {
    let heads = BranchHeads::new(
        MirrorId::new(GUARD_ID, "/g"),
        vec![CommitInfo::new("master", "c1"), CommitInfo::new("feature/foo", "c2")],
    );
    assert_eq!(heads.head("feature/foo").map(|h| h.commit_id.as_str()), Some("c2"));
    assert!(heads.head("develop").is_none());
}

#[test]
fn commit_info_equality_is_structural() {
    let plain = CommitInfo::new("master", "c1");
    let tagged = CommitInfo::new("master", "c1").with_tags(vec!["0.0.1".into()]);
    assert_ne!(plain, tagged);
    assert_ne!(plain.clone().with_message("fix"), plain);
}

#[test]
fn commit_info_serializes_with_camel_case_field_names() {
    let head = CommitInfo::new("master", "c1").with_message("init").with_tags(vec!["v1".into()]);
    let json = serde_json::to_value(&head).unwrap();
    assert_eq!(json["commitId"], "c1");
    assert_eq!(json["branch"], "master");
    assert_eq!(json["tags"][0], "v1");
}
