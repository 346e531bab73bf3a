// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervisor lifecycle events and the process exit status record.

use crate::emitter::Topic;
use crate::job::JobName;
use serde::{Deserialize, Serialize};

/// Terminal status of a reaped process.
///
/// Exactly one of `code` / `signal` is set for a normally observed exit;
/// both are `None` only when the wait itself failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;
        Self {
            code: status.code(),
            signal: status.signal(),
        }
    }
}

impl std::fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "signal {signal}"),
            (None, None) => write!(f, "unknown"),
        }
    }
}

/// Events published by the manager.
///
/// Serializes with `{"type": "<topic>", ...fields}` format; the topic
/// string doubles as the subscription key on the emitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A job entered the running state.
    Start { job: JobName },

    /// A new process was forked for a job.
    Spawn { job: JobName, pid: u32 },

    /// A process exited and was reaped. Published exactly once per pid.
    Exit {
        job: JobName,
        pid: u32,
        status: ExitStatus,
    },

    /// A job was stopped (explicitly or while being removed).
    Stop { job: JobName },

    /// The desired process count of a job changed.
    Update { job: JobName, numprocesses: u32 },

    /// A job crossed the restart threshold and its restarts are paused.
    Flapping { job: JobName },

    /// The OS rejected a spawn; the job keeps its desired count and the
    /// replacement is retried under the flapping guard.
    SpawnError { job: JobName, error: String },

    /// The manager finished shutting down.
    Shutdown,
}

impl Event {
    /// Job this event concerns, if any.
    pub fn job(&self) -> Option<&JobName> {
        match self {
            Event::Start { job }
            | Event::Spawn { job, .. }
            | Event::Exit { job, .. }
            | Event::Stop { job }
            | Event::Update { job, .. }
            | Event::Flapping { job }
            | Event::SpawnError { job, .. } => Some(job),
            Event::Shutdown => None,
        }
    }

    /// Every topic the manager publishes, in no particular order.
    pub const TOPICS: &'static [&'static str] = &[
        "start",
        "spawn",
        "exit",
        "stop",
        "update",
        "flapping",
        "spawn_error",
        "shutdown",
    ];
}

impl Topic for Event {
    fn topic(&self) -> &'static str {
        match self {
            Event::Start { .. } => "start",
            Event::Spawn { .. } => "spawn",
            Event::Exit { .. } => "exit",
            Event::Stop { .. } => "stop",
            Event::Update { .. } => "update",
            Event::Flapping { .. } => "flapping",
            Event::SpawnError { .. } => "spawn_error",
            Event::Shutdown => "shutdown",
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
