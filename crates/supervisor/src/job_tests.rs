// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tokio::sync::mpsc;

fn job(numprocesses: u32) -> Job {
    let name = JobName::parse("test.sleeper").unwrap();
    let spec = JobSpec::new("/bin/sleep")
        .with_args(["60"])
        .with_numprocesses(numprocesses);
    Job::new(name, spec)
}

#[tokio::test]
async fn spawn_one_grows_the_live_set() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut job = job(2);
    assert!(job.needs_more());
    assert_eq!(job.state(), JobState::Pending);

    let (id, pid) = job.spawn_one(&tx).unwrap();
    assert!(pid > 0);
    assert_eq!(job.live_len(), 1);
    assert!(job.needs_more());

    job.spawn_one(&tx).unwrap();
    assert!(!job.needs_more());
    assert!(!job.has_surplus());

    job.stop_all(Signal::SIGKILL);
    assert!(job.reap(id).is_some());
    // reaping the same id twice yields nothing
    assert!(job.reap(id).is_none());
}

#[tokio::test]
async fn newest_returns_the_last_spawned() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut job = job(3);
    let (first, _) = job.spawn_one(&tx).unwrap();
    let (second, _) = job.spawn_one(&tx).unwrap();
    let (third, _) = job.spawn_one(&tx).unwrap();

    assert_eq!(job.newest(2), vec![second, third]);
    assert_eq!(job.newest(5), vec![first, second, third]);

    job.set_numprocesses(1);
    assert!(job.has_surplus());

    job.stop_all(Signal::SIGKILL);
}

#[test]
fn restart_guard_pauses_at_the_threshold() {
    let guard = FlapGuard {
        max_restarts: 3,
        window: Duration::from_secs(60),
    };
    let mut job = job(1);
    let now = Instant::now();

    assert!(!job.record_restart(&guard, now));
    assert!(!job.record_restart(&guard, now + Duration::from_secs(1)));
    assert!(!job.is_paused(now + Duration::from_secs(1)));

    // third restart in the window crosses the threshold
    assert!(job.record_restart(&guard, now + Duration::from_secs(2)));
    assert!(job.is_paused(now + Duration::from_secs(3)));
    assert!(!job.is_paused(now + Duration::from_secs(120)));
}

#[test]
fn old_restarts_age_out_of_the_window() {
    let guard = FlapGuard {
        max_restarts: 3,
        window: Duration::from_secs(10),
    };
    let mut job = job(1);
    let now = Instant::now();

    assert!(!job.record_restart(&guard, now));
    assert!(!job.record_restart(&guard, now + Duration::from_secs(1)));
    // the first two restarts are outside the window by now
    assert!(!job.record_restart(&guard, now + Duration::from_secs(30)));
    assert!(!job.is_paused(now + Duration::from_secs(30)));
}

#[test]
fn resume_clears_the_pause() {
    let guard = FlapGuard {
        max_restarts: 1,
        window: Duration::from_secs(60),
    };
    let mut job = job(1);
    let now = Instant::now();

    assert!(job.record_restart(&guard, now));
    assert!(job.is_paused(now));

    job.resume();
    assert!(!job.is_paused(now));
}

#[test]
fn snapshot_reflects_state() {
    let mut job = job(4);
    job.set_state(JobState::Running);

    let snap = job.snapshot(Instant::now());
    assert_eq!(snap.name.to_string(), "test.sleeper");
    assert_eq!(snap.state, JobState::Running);
    assert_eq!(snap.numprocesses, 4);
    assert!(snap.pids.is_empty());
    assert!(!snap.flapping);
}

#[test]
fn removing_forces_stopped() {
    let mut job = job(1);
    job.set_state(JobState::Running);
    job.set_removing();
    assert!(job.is_removing());
    assert_eq!(job.state(), JobState::Stopped);
}
