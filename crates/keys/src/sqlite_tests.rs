// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::backend::KeysConfig;
use crate::key::{KeyData, Permissions};

fn memory_backend() -> SqliteKeyBackend {
    let mut backend = SqliteKeyBackend::new(&KeysConfig::in_memory());
    backend.open().unwrap();
    backend
}

fn data(label: &str) -> serde_json::Value {
    serde_json::to_value(KeyData {
        label: label.to_string(),
        permissions: Permissions::default(),
    })
    .unwrap()
}

#[test]
fn set_then_get() {
    let mut backend = memory_backend();
    backend.set_key("root", &data("the root"), None).unwrap();

    let key = backend.get_key("root").unwrap();
    assert_eq!(key.api_key(), "root");
    assert_eq!(key.label(), "the root");
    assert!(backend.has_key("root").unwrap());
}

#[test]
fn get_missing_is_key_not_found() {
    let mut backend = memory_backend();
    let err = backend.get_key("ghost").unwrap_err();
    assert!(matches!(err, KeyError::KeyNotFound(k) if k == "ghost"));
    assert!(!backend.has_key("ghost").unwrap());
}

#[test]
fn duplicate_insert_is_conflict() {
    let mut backend = memory_backend();
    backend.set_key("root", &data("first"), None).unwrap();

    let err = backend.set_key("root", &data("second"), None).unwrap_err();
    assert!(matches!(err, KeyError::KeyConflict(k) if k == "root"));

    // the original row is untouched
    assert_eq!(backend.get_key("root").unwrap().label(), "first");
}

#[test]
fn missing_parent_rejects_insert() {
    let mut backend = memory_backend();
    let err = backend
        .set_key("child", &data("child"), Some("ghost"))
        .unwrap_err();
    assert!(matches!(err, KeyError::KeyNotFound(k) if k == "ghost"));
    assert!(!backend.has_key("child").unwrap());
}

#[test]
fn subkeys_are_one_level() {
    let mut backend = memory_backend();
    backend.set_key("root", &data("root"), None).unwrap();
    backend.set_key("a", &data("a"), Some("root")).unwrap();
    backend.set_key("b", &data("b"), Some("root")).unwrap();
    backend.set_key("a1", &data("a1"), Some("a")).unwrap();

    let mut children: Vec<String> = backend
        .all_subkeys("root")
        .unwrap()
        .into_iter()
        .map(|k| k.api_key().to_string())
        .collect();
    children.sort();
    assert_eq!(children, vec!["a", "b"]);
}

#[test]
fn all_keys_lists_every_row() {
    let mut backend = memory_backend();
    backend.set_key("one", &data("1"), None).unwrap();
    backend.set_key("two", &data("2"), Some("one")).unwrap();

    let mut keys: Vec<String> = backend
        .all_keys()
        .unwrap()
        .into_iter()
        .map(|k| k.api_key().to_string())
        .collect();
    keys.sort();
    assert_eq!(keys, vec!["one", "two"]);
}

#[test]
fn delete_removes_only_the_row() {
    let mut backend = memory_backend();
    backend.set_key("root", &data("root"), None).unwrap();
    backend.set_key("child", &data("child"), Some("root")).unwrap();

    backend.delete_key("root").unwrap();
    assert!(!backend.has_key("root").unwrap());
    // cascade lives in the manager; the backend deletes a single row
    assert!(backend.has_key("child").unwrap());
}

#[test]
fn file_backend_persists_and_reopen_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = KeysConfig {
        config_dir: dir.path().to_path_buf(),
        ..KeysConfig::default()
    };

    let mut backend = SqliteKeyBackend::new(&cfg);
    backend.open().unwrap();
    backend.set_key("persisted", &data("on disk"), None).unwrap();
    backend.close().unwrap();

    assert!(dir.path().join("keys.db").is_file());

    // reopening an existing file must not choke on the existing schema
    let mut backend = SqliteKeyBackend::new(&cfg);
    backend.open().unwrap();
    assert_eq!(backend.get_key("persisted").unwrap().label(), "on disk");
    backend.close().unwrap();
}

#[test]
fn open_twice_is_a_noop() {
    let mut backend = memory_backend();
    backend.set_key("kept", &data("kept"), None).unwrap();
    backend.open().unwrap();
    assert!(backend.has_key("kept").unwrap());
}
