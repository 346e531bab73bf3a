// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use gaffer_core::JobSpec;
use tokio::sync::mpsc;

fn job_name() -> JobName {
    JobName::parse("test.proc").unwrap()
}

fn waited(spawned: Spawned, notices: mpsc::UnboundedSender<ExitNotice>) -> Process {
    let process = spawned.process;
    spawn_waiter(
        process.job().clone(),
        process.id(),
        process.pid(),
        spawned.child,
        spawned.exit_tx,
        notices,
    );
    process
}

#[tokio::test]
async fn spawn_and_wait_reports_exit_code() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let spawned = Process::spawn(&job_name(), &JobSpec::new("/bin/true")).unwrap();
    let process = waited(spawned, tx);

    assert!(process.pid() > 0);

    let status = process.wait().await;
    assert!(status.success());
    assert!(!process.is_alive());
    assert_eq!(process.exit_status(), Some(status.clone()));

    let notice = rx.recv().await.unwrap();
    assert_eq!(notice.process, process.id());
    assert_eq!(notice.pid, process.pid());
    assert_eq!(notice.status, status);
    assert!(!notice.wait_failed);
}

#[tokio::test]
async fn nonzero_exit_is_reported() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let spawned = Process::spawn(&job_name(), &JobSpec::new("/bin/false")).unwrap();
    let _process = waited(spawned, tx);

    let notice = rx.recv().await.unwrap();
    assert_eq!(notice.status.code, Some(1));
    assert!(!notice.status.success());
}

#[tokio::test]
async fn stop_delivers_the_signal() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let spawned =
        Process::spawn(&job_name(), &JobSpec::new("/bin/sleep").with_args(["60"])).unwrap();
    let process = waited(spawned, tx);

    assert!(process.is_alive());
    process.stop(Signal::SIGTERM).unwrap();

    let notice = rx.recv().await.unwrap();
    assert_eq!(notice.status.signal, Some(libc_sigterm()));
    assert_eq!(notice.status.code, None);
}

#[tokio::test]
async fn signalling_an_exited_pid_is_not_an_error() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let spawned = Process::spawn(&job_name(), &JobSpec::new("/bin/true")).unwrap();
    let process = waited(spawned, tx);

    // make sure it is gone before signalling
    let _ = rx.recv().await.unwrap();
    process.wait().await;

    process.stop(Signal::SIGTERM).unwrap();
}

#[tokio::test]
async fn spawn_failure_is_structured() {
    let err = Process::spawn(&job_name(), &JobSpec::new("/nonexistent/no-such-binary"))
        .unwrap_err();
    match err {
        SupervisorError::SpawnFailed { job, source } => {
            assert_eq!(job, job_name());
            assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn env_cwd_and_args_are_applied() {
    let dir = tempfile::tempdir().unwrap();
    let spec = JobSpec::new("/bin/sh")
        .with_args(["-c", "test \"$MARKER\" = set && touch ./spawned-here"])
        .with_env("MARKER", "set");
    let spec = JobSpec {
        cwd: Some(dir.path().to_path_buf()),
        ..spec
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let spawned = Process::spawn(&job_name(), &spec).unwrap();
    let _process = waited(spawned, tx);

    let notice = rx.recv().await.unwrap();
    assert!(notice.status.success(), "status: {:?}", notice.status);
    assert!(dir.path().join("spawned-here").is_file());
}

#[test]
fn process_ids_are_unique() {
    let a = ProcessId::next();
    let b = ProcessId::next();
    assert_ne!(a, b);
}

fn libc_sigterm() -> i32 {
    Signal::SIGTERM as i32
}
