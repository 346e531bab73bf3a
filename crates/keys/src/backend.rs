// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable key storage behind a trait seam.
//!
//! Backends are addressed by name through the `keys_backend` config
//! entry; the default is the embedded SQLite store. `data` is handed to
//! the backend as opaque JSON.

use crate::error::KeyError;
use crate::key::Key;
use crate::sqlite::SqliteKeyBackend;
use std::path::PathBuf;

/// Key-store configuration handed down from the daemon config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeysConfig {
    /// Backend name; empty or `"default"` selects the SQLite store.
    pub backend: String,
    /// Database file name under `config_dir`, or the `:memory:` sentinel.
    pub dbname: String,
    /// Directory the database file lives in.
    pub config_dir: PathBuf,
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            backend: "default".to_string(),
            dbname: "keys.db".to_string(),
            config_dir: PathBuf::from("."),
        }
    }
}

impl KeysConfig {
    /// In-memory store, for tests and ephemeral daemons.
    pub fn in_memory() -> Self {
        Self {
            dbname: ":memory:".to_string(),
            ..Self::default()
        }
    }
}

/// Operations every key backend provides.
///
/// Callers hold the backend behind the key manager's lock; methods take
/// `&mut self` so implementations need no interior synchronization.
pub trait KeyBackend: Send + std::fmt::Debug {
    fn open(&mut self) -> Result<(), KeyError>;
    fn close(&mut self) -> Result<(), KeyError>;
    fn all_keys(&mut self) -> Result<Vec<Key>, KeyError>;
    fn set_key(
        &mut self,
        api_key: &str,
        data: &serde_json::Value,
        parent: Option<&str>,
    ) -> Result<(), KeyError>;
    fn get_key(&mut self, api_key: &str) -> Result<Key, KeyError>;
    fn delete_key(&mut self, api_key: &str) -> Result<(), KeyError>;
    fn has_key(&mut self, api_key: &str) -> Result<bool, KeyError>;
    /// Direct children of `api_key` (one level, not transitive).
    fn all_subkeys(&mut self, api_key: &str) -> Result<Vec<Key>, KeyError>;
}

/// Resolve a backend by configured name.
pub fn open_backend(cfg: &KeysConfig) -> Result<Box<dyn KeyBackend>, KeyError> {
    match cfg.backend.as_str() {
        "" | "default" | "sqlite" => Ok(Box::new(SqliteKeyBackend::new(cfg))),
        other => Err(KeyError::UnknownBackend(other.to_string())),
    }
}

#[cfg(test)]
#[path = "backend_tests.rs"]
mod tests;
