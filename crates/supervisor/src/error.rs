// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error kinds raised by the supervisor.

use gaffer_core::{JobName, NameError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("job already exists: {0}")]
    JobExists(JobName),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("spawn failed for job {job}: {source}")]
    SpawnFailed {
        job: JobName,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to signal pid {pid}: {errno}")]
    SignalFailed { pid: u32, errno: nix::errno::Errno },

    #[error("manager is not running")]
    ManagerClosed,

    #[error(transparent)]
    Name(#[from] NameError),
}
