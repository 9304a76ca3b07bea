// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn store() -> (tempfile::TempDir, StateStore) {
    let dir = tempfile::tempdir().unwrap();
    let s = StateStore::open(dir.path(), vec![], vec![]).unwrap();
    (dir, s)
}

#[test]
fn bind_then_get_round_trips() {
    let (_dir, s) = store();
    s.bind_account("user-1", "acc-1", "Alice", 100).unwrap();
    assert_eq!(s.get_bound_account("user-1"), Some("acc-1".to_owned()));
}

#[test]
fn rebinding_same_user_to_same_account_is_a_no_op_update() {
    let (_dir, s) = store();
    s.bind_account("user-1", "acc-1", "Alice", 100).unwrap();
    s.bind_account("user-1", "acc-1", "Alice", 200).unwrap();
    let info = s.get_bound_account_info("user-1").unwrap();
    assert_eq!(info.updated_at, 200);
}

#[test]
fn binding_an_already_owned_account_to_a_different_user_fails() {
    let (_dir, s) = store();
    s.bind_account("user-1", "acc-1", "Alice", 100).unwrap();
    let err = s.bind_account("user-2", "acc-1", "Bob", 200).unwrap_err();
    assert_eq!(err.code(), "E_ALREADY_BOUND");
    assert_eq!(s.get_bound_account("user-1"), Some("acc-1".to_owned()));
}

#[test]
fn rebinding_user_to_new_account_releases_old_account() {
    let (_dir, s) = store();
    s.bind_account("user-1", "acc-1", "Alice", 100).unwrap();
    s.bind_account("user-1", "acc-2", "Alice", 200).unwrap();
    assert_eq!(s.get_bound_account("user-1"), Some("acc-2".to_owned()));
    // acc-1 is free again.
    s.bind_account("user-2", "acc-1", "Bob", 300).unwrap();
}

#[test]
fn unbind_removes_both_directions() {
    let (_dir, s) = store();
    s.bind_account("user-1", "acc-1", "Alice", 100).unwrap();
    let removed = s.unbind_account("user-1").unwrap();
    assert_eq!(removed, Some("acc-1".to_owned()));
    assert_eq!(s.get_bound_account("user-1"), None);
    // acc-1 can be claimed by someone else now.
    s.bind_account("user-2", "acc-1", "Bob", 200).unwrap();
}

#[test]
fn bindings_persist_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let s = StateStore::open(dir.path(), vec![], vec![]).unwrap();
        s.bind_account("user-1", "acc-1", "Alice", 100).unwrap();
    }
    let s2 = StateStore::open(dir.path(), vec![], vec![]).unwrap();
    assert_eq!(s2.get_bound_account("user-1"), Some("acc-1".to_owned()));
}

#[test]
fn legacy_owners_file_with_conflicting_claims_resolves_by_latest_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bindings_v2.json");
    std::fs::write(
        &path,
        r#"{"owners": {
            "user-1": {"account_id": "acc-1", "account_name": "Alice", "updated_at": 100},
            "user-2": {"account_id": "acc-1", "account_name": "Bob", "updated_at": 500}
        }}"#,
    )
    .unwrap();
    let s = StateStore::open(dir.path(), vec![], vec![]).unwrap();
    assert_eq!(s.get_bound_account("user-2"), Some("acc-1".to_owned()));
    assert_eq!(s.get_bound_account("user-1"), None);
    // the loser is free to bind elsewhere, proving bijectivity was repaired.
    s.bind_account("user-1", "acc-2", "Alice", 600).unwrap();
}

#[test]
fn whitelist_merges_static_and_persisted_without_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let s = StateStore::open(dir.path(), vec!["static-1".to_owned()], vec![]).unwrap();
    s.add_whitelist_user("dynamic-1").unwrap();
    s.add_whitelist_user("static-1").unwrap();
    let users = s.list_whitelist_users();
    assert_eq!(users, vec!["static-1".to_owned(), "dynamic-1".to_owned()]);
}

#[test]
fn removing_a_whitelist_user_only_affects_the_dynamic_list() {
    let dir = tempfile::tempdir().unwrap();
    let s = StateStore::open(dir.path(), vec!["static-1".to_owned()], vec![]).unwrap();
    s.add_whitelist_user("dynamic-1").unwrap();
    s.remove_whitelist_user("dynamic-1").unwrap();
    s.remove_whitelist_user("static-1").unwrap();
    // static entries cannot be removed through the dynamic list.
    assert_eq!(s.list_whitelist_users(), vec!["static-1".to_owned()]);
}

#[test]
fn is_user_allowed_checks_the_merged_list() {
    let dir = tempfile::tempdir().unwrap();
    let s = StateStore::open(dir.path(), vec!["static-1".to_owned()], vec![]).unwrap();
    assert!(s.is_user_allowed("static-1"));
    assert!(!s.is_user_allowed("nobody"));
    s.add_whitelist_user("dynamic-1").unwrap();
    assert!(s.is_user_allowed("dynamic-1"));
}

#[test]
fn theme_defaults_to_light_and_rejects_unknown_values() {
    let (_dir, s) = store();
    assert_eq!(s.get_render_theme("dark"), "light");
    let err = s.set_render_theme("purple").unwrap_err();
    assert_eq!(err.code(), "E_INVALID_ARGUMENT");
}

#[test]
fn theme_round_trips_through_persistence() {
    let dir = tempfile::tempdir().unwrap();
    {
        let s = StateStore::open(dir.path(), vec![], vec![]).unwrap();
        s.set_render_theme("dark").unwrap();
    }
    let s2 = StateStore::open(dir.path(), vec![], vec![]).unwrap();
    assert_eq!(s2.get_render_theme("light"), "dark");
}

#[test]
fn empty_ids_are_rejected_or_ignored_rather_than_corrupting_state() {
    let (_dir, s) = store();
    let err = s.bind_account("", "acc-1", "Alice", 100).unwrap_err();
    assert_eq!(err.code(), "E_INVALID_ARGUMENT");
    assert_eq!(s.add_whitelist_user("   ").unwrap(), false);
}
