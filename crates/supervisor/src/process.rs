// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handle for one running OS process belonging to a job.
//!
//! Spawning forks/execs the job's command template; the child handle
//! moves into a wait task that resolves the exit watch channel and posts
//! an exit notice to the manager loop. Only the manager's wait tasks
//! reap children.

use crate::error::SupervisorError;
use gaffer_core::{ExitStatus, JobName, JobSpec};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};

static NEXT_PROCESS_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque process identity, unique for the daemon lifetime.
///
/// Distinct from the OS pid, which the kernel may reuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ProcessId(u64);

impl ProcessId {
    fn next() -> Self {
        Self(NEXT_PROCESS_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Notice posted by a wait task when its child exits.
#[derive(Debug)]
pub(crate) struct ExitNotice {
    pub job: JobName,
    pub process: ProcessId,
    pub pid: u32,
    pub status: ExitStatus,
    /// The wait itself failed; the manager treats this as fatal.
    pub wait_failed: bool,
}

#[derive(Debug)]
pub(crate) struct Spawned {
    pub process: Process,
    pub child: Child,
    pub exit_tx: watch::Sender<Option<ExitStatus>>,
}

/// One running OS process. Either live (no exit observed) or terminated
/// (exit status set); nothing in between.
#[derive(Debug)]
pub struct Process {
    id: ProcessId,
    job: JobName,
    pid: u32,
    started_at: Instant,
    exit: watch::Receiver<Option<ExitStatus>>,
}

impl Process {
    /// Fork and exec the template. The caller is responsible for handing
    /// the returned child to [`spawn_waiter`].
    pub(crate) fn spawn(job: &JobName, spec: &JobSpec) -> Result<Spawned, SupervisorError> {
        let mut command = Command::new(&spec.cmd);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .kill_on_drop(false);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }
        if let Some(uid) = spec.uid {
            command.uid(uid);
        }
        if let Some(gid) = spec.gid {
            command.gid(gid);
        }
        if spec.detach {
            command.process_group(0);
        }

        let child = command.spawn().map_err(|source| SupervisorError::SpawnFailed {
            job: job.clone(),
            source,
        })?;
        let pid = child.id().ok_or_else(|| SupervisorError::SpawnFailed {
            job: job.clone(),
            source: std::io::Error::other("child pid unavailable after spawn"),
        })?;

        let (exit_tx, exit_rx) = watch::channel(None);
        Ok(Spawned {
            process: Process {
                id: ProcessId::next(),
                job: job.clone(),
                pid,
                started_at: Instant::now(),
                exit: exit_rx,
            },
            child,
            exit_tx,
        })
    }

    pub fn id(&self) -> ProcessId {
        self.id
    }

    pub fn job(&self) -> &JobName {
        &self.job
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// True until the wait task observes the exit.
    pub fn is_alive(&self) -> bool {
        self.exit.borrow().is_none()
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit.borrow().clone()
    }

    /// Deliver a signal. A pid that already exited is not an error.
    pub fn stop(&self, signal: Signal) -> Result<(), SupervisorError> {
        deliver_signal(self.pid, signal)
    }

    /// Block until the process exits and return its status.
    pub async fn wait(&self) -> ExitStatus {
        let mut rx = self.exit.clone();
        let result = match rx.wait_for(Option::is_some).await {
            Ok(status) => status.clone().unwrap_or_default(),
            // Sender dropped without an exit: the wait task died with us
            Err(_) => ExitStatus::default(),
        };
        result
    }
}

/// Signal a pid, swallowing ESRCH.
pub(crate) fn deliver_signal(pid: u32, signal: Signal) -> Result<(), SupervisorError> {
    match kill(Pid::from_raw(pid as i32), signal) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
        Err(errno) => Err(SupervisorError::SignalFailed { pid, errno }),
    }
}

/// Move the child into a task that waits for its exit, resolves the
/// process's watch channel, and posts the notice to the manager loop.
pub(crate) fn spawn_waiter(
    job: JobName,
    process: ProcessId,
    pid: u32,
    mut child: Child,
    exit_tx: watch::Sender<Option<ExitStatus>>,
    notices: mpsc::UnboundedSender<ExitNotice>,
) {
    tokio::spawn(async move {
        let (status, wait_failed) = match child.wait().await {
            Ok(status) => (ExitStatus::from(status), false),
            Err(e) => {
                tracing::error!(job = %job, pid, error = %e, "wait for child failed");
                (ExitStatus::default(), true)
            }
        };
        let _ = exit_tx.send(Some(status.clone()));
        let _ = notices.send(ExitNotice {
            job,
            process,
            pid,
            status,
            wait_failed,
        });
    });
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
