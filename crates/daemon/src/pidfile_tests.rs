// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn writes_pid_and_newline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gafferd.pid");

    let pidfile = PidFile::create(&path).unwrap();
    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents, format!("{}\n", std::process::id()));
    assert_eq!(pidfile.path(), path);
}

#[test]
fn second_create_in_the_same_process_conflicts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gafferd.pid");

    let _held = PidFile::create(&path).unwrap();
    let err = PidFile::create(&path).unwrap_err();
    assert!(matches!(err, PidFileError::Locked { .. }));
}

#[test]
fn drop_removes_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gafferd.pid");

    let pidfile = PidFile::create(&path).unwrap();
    assert!(path.is_file());
    drop(pidfile);
    assert!(!path.exists());

    // and the path is immediately reusable
    let _again = PidFile::create(&path).unwrap();
}

#[test]
fn stale_file_without_lock_is_taken_over() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gafferd.pid");
    std::fs::write(&path, "99999\n").unwrap();

    let _pidfile = PidFile::create(&path).unwrap();
    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents.trim(), std::process::id().to_string());
}
