// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::error::KeyError;
use yare::parameterized;

#[parameterized(
    empty = { "" },
    default = { "default" },
    sqlite = { "sqlite" },
)]
fn known_backend_names_resolve(name: &str) {
    let cfg = KeysConfig {
        backend: name.to_string(),
        ..KeysConfig::in_memory()
    };
    assert!(open_backend(&cfg).is_ok());
}

#[test]
fn unknown_backend_name_is_an_error() {
    let cfg = KeysConfig {
        backend: "etcd".to_string(),
        ..KeysConfig::in_memory()
    };
    let err = open_backend(&cfg).unwrap_err();
    assert!(matches!(err, KeyError::UnknownBackend(name) if name == "etcd"));
}

#[test]
fn operations_fail_before_open() {
    let cfg = KeysConfig::in_memory();
    let mut backend = open_backend(&cfg).unwrap();
    assert!(matches!(
        backend.get_key("anything"),
        Err(KeyError::BackendClosed)
    ));
}
