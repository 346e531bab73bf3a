// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-job supervision state: the live process set, the stopped flag,
//! and the restart accounting behind the flapping guard.

use crate::error::SupervisorError;
use crate::process::{spawn_waiter, ExitNotice, Process, ProcessId};
use gaffer_core::{JobName, JobSpec};
use indexmap::IndexMap;
use nix::sys::signal::Signal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Rapid-restart guard: a job reaped `max_restarts` times within
/// `window` has its restarts paused for `window`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlapGuard {
    pub max_restarts: usize,
    pub window: Duration,
}

impl Default for FlapGuard {
    fn default() -> Self {
        Self {
            max_restarts: 5,
            window: Duration::from_secs(60),
        }
    }
}

/// Externally visible job states.
///
/// `pending` sits between `add_job` and the first spawn when the job was
/// added with `start = false`. Removal is terminal and not represented:
/// a removed job has no snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Stopped,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Running => write!(f, "running"),
            JobState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Point-in-time view of a job, as returned by list/get operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub name: JobName,
    pub state: JobState,
    pub numprocesses: u32,
    pub pids: Vec<u32>,
    pub flapping: bool,
}

/// A supervised job. Owned by the manager; not public API.
pub(crate) struct Job {
    name: JobName,
    spec: JobSpec,
    state: JobState,
    removing: bool,
    /// Live processes in spawn order; the newest are at the back.
    live: IndexMap<ProcessId, Process>,
    restarts: VecDeque<Instant>,
    flapping_until: Option<Instant>,
}

impl Job {
    pub fn new(name: JobName, spec: JobSpec) -> Self {
        Self {
            name,
            spec,
            state: JobState::Pending,
            removing: false,
            live: IndexMap::new(),
            restarts: VecDeque::new(),
            flapping_until: None,
        }
    }

    pub fn name(&self) -> &JobName {
        &self.name
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn set_state(&mut self, state: JobState) {
        self.state = state;
    }

    pub fn is_removing(&self) -> bool {
        self.removing
    }

    pub fn set_removing(&mut self) {
        self.removing = true;
        self.state = JobState::Stopped;
    }

    pub fn numprocesses(&self) -> u32 {
        self.spec.numprocesses
    }

    pub fn set_numprocesses(&mut self, numprocesses: u32) {
        self.spec.numprocesses = numprocesses;
    }

    pub fn starts_immediately(&self) -> bool {
        self.spec.start
    }

    /// Spawn one process from the template, insert it into the live set,
    /// and hand its child to a wait task feeding `notices`.
    pub fn spawn_one(
        &mut self,
        notices: &mpsc::UnboundedSender<ExitNotice>,
    ) -> Result<(ProcessId, u32), SupervisorError> {
        let spawned = Process::spawn(&self.name, &self.spec)?;
        let id = spawned.process.id();
        let pid = spawned.process.pid();
        spawn_waiter(
            self.name.clone(),
            id,
            pid,
            spawned.child,
            spawned.exit_tx,
            notices.clone(),
        );
        self.live.insert(id, spawned.process);
        Ok((id, pid))
    }

    /// Remove a terminated process from the live set. `None` when the
    /// id is unknown, which makes duplicate notices harmless.
    pub fn reap(&mut self, id: ProcessId) -> Option<Process> {
        self.live.shift_remove(&id)
    }

    pub fn needs_more(&self) -> bool {
        (self.live.len() as u32) < self.spec.numprocesses
    }

    pub fn has_surplus(&self) -> bool {
        (self.live.len() as u32) > self.spec.numprocesses
    }

    pub fn live_len(&self) -> usize {
        self.live.len()
    }

    pub fn is_drained(&self) -> bool {
        self.live.is_empty()
    }

    pub fn live_ids(&self) -> Vec<ProcessId> {
        self.live.keys().copied().collect()
    }

    /// The n newest live processes (spawned last).
    pub fn newest(&self, n: usize) -> Vec<ProcessId> {
        let skip = self.live.len().saturating_sub(n);
        self.live.keys().skip(skip).copied().collect()
    }

    /// Signal every live process; does not wait.
    pub fn stop_all(&self, signal: Signal) {
        for process in self.live.values() {
            if let Err(e) = process.stop(signal) {
                tracing::warn!(job = %self.name, pid = process.pid(), error = %e, "signal failed");
            }
        }
    }

    /// Signal a subset of the live set; unknown ids are skipped.
    pub fn signal_processes(&self, ids: &[ProcessId], signal: Signal) {
        for id in ids {
            if let Some(process) = self.live.get(id) {
                if let Err(e) = process.stop(signal) {
                    tracing::warn!(job = %self.name, pid = process.pid(), error = %e, "signal failed");
                }
            }
        }
    }

    /// Record one restart attempt against the guard. Returns true when
    /// the job just crossed the threshold and restarts are now paused.
    pub fn record_restart(&mut self, guard: &FlapGuard, now: Instant) -> bool {
        self.restarts.push_back(now);
        while let Some(&oldest) = self.restarts.front() {
            if now.duration_since(oldest) > guard.window {
                self.restarts.pop_front();
            } else {
                break;
            }
        }
        if self.restarts.len() >= guard.max_restarts {
            self.flapping_until = Some(now + guard.window);
            self.restarts.clear();
            true
        } else {
            false
        }
    }

    pub fn is_paused(&self, now: Instant) -> bool {
        self.flapping_until.is_some_and(|until| now < until)
    }

    pub fn resume(&mut self) {
        self.flapping_until = None;
    }

    pub fn snapshot(&self, now: Instant) -> JobSnapshot {
        JobSnapshot {
            name: self.name.clone(),
            state: self.state,
            numprocesses: self.spec.numprocesses,
            pids: self.live.values().map(Process::pid).collect(),
            flapping: self.is_paused(now),
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
