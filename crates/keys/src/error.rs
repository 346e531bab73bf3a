// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error kinds raised by the key store.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("key already exists: {0}")]
    KeyConflict(String),

    #[error("invalid key record: missing \"key\" field")]
    InvalidKey,

    #[error("unknown permission: {0:?}")]
    UnknownPermission(String),

    #[error("unknown keys backend: {0:?}")]
    UnknownBackend(String),

    #[error("key backend is not open")]
    BackendClosed,

    #[error("key backend error: {0}")]
    Backend(#[from] rusqlite::Error),

    #[error("key serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl KeyError {
    /// True for the kinds a caller can recover from by changing the
    /// request (as opposed to backend I/O trouble).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            KeyError::KeyNotFound(_)
                | KeyError::KeyConflict(_)
                | KeyError::InvalidKey
                | KeyError::UnknownPermission(_)
        )
    }
}
