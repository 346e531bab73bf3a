// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Embedded SQLite key backend.
//!
//! One row per key: `(api_key PRIMARY KEY, data TEXT, parent TEXT)` with
//! an index on `parent` for subkey lookups. The schema statements are
//! idempotent and run on every open. Writes are wrapped in transactions
//! so a crash mid-operation commits all or nothing.

use crate::backend::{KeyBackend, KeysConfig};
use crate::error::KeyError;
use crate::key::Key;
use rusqlite::{Connection, OptionalExtension};
use std::path::PathBuf;

/// Sentinel database name selecting an in-memory store.
pub const MEMORY_DBNAME: &str = ":memory:";

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS keys (
    api_key TEXT PRIMARY KEY,
    data    TEXT NOT NULL,
    parent  TEXT
);
CREATE INDEX IF NOT EXISTS keys_parent ON keys (parent);
";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Location {
    Memory,
    File(PathBuf),
}

#[derive(Debug)]
pub struct SqliteKeyBackend {
    location: Location,
    conn: Option<Connection>,
}

impl SqliteKeyBackend {
    pub fn new(cfg: &KeysConfig) -> Self {
        let location = if cfg.dbname == MEMORY_DBNAME {
            Location::Memory
        } else {
            Location::File(cfg.config_dir.join(&cfg.dbname))
        };
        Self {
            location,
            conn: None,
        }
    }

    fn conn(&mut self) -> Result<&mut Connection, KeyError> {
        self.conn.as_mut().ok_or(KeyError::BackendClosed)
    }

    fn row_to_key(api_key: &str, data: &str) -> Result<Key, KeyError> {
        let mut obj: serde_json::Value = serde_json::from_str(data)?;
        if let Some(map) = obj.as_object_mut() {
            map.insert("key".to_string(), serde_json::Value::from(api_key));
        }
        Key::load(&obj)
    }
}

impl KeyBackend for SqliteKeyBackend {
    fn open(&mut self) -> Result<(), KeyError> {
        if self.conn.is_some() {
            return Ok(());
        }
        let conn = match &self.location {
            Location::Memory => Connection::open_in_memory()?,
            Location::File(path) => Connection::open(path)?,
        };
        conn.execute_batch(SCHEMA)?;
        self.conn = Some(conn);
        Ok(())
    }

    fn close(&mut self) -> Result<(), KeyError> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_conn, e)| KeyError::Backend(e))?;
        }
        Ok(())
    }

    fn all_keys(&mut self) -> Result<Vec<Key>, KeyError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT api_key, data FROM keys")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut keys = Vec::new();
        for row in rows {
            let (api_key, data) = row?;
            keys.push(Self::row_to_key(&api_key, &data)?);
        }
        Ok(keys)
    }

    fn set_key(
        &mut self,
        api_key: &str,
        data: &serde_json::Value,
        parent: Option<&str>,
    ) -> Result<(), KeyError> {
        let serialized = serde_json::to_string(data)?;
        let conn = self.conn()?;
        let tx = conn.transaction()?;
        if let Some(parent) = parent {
            let found: Option<i64> = tx
                .query_row("SELECT 1 FROM keys WHERE api_key = ?1", [parent], |row| {
                    row.get(0)
                })
                .optional()?;
            if found.is_none() {
                return Err(KeyError::KeyNotFound(parent.to_string()));
            }
        }
        let existing: Option<i64> = tx
            .query_row("SELECT 1 FROM keys WHERE api_key = ?1", [api_key], |row| {
                row.get(0)
            })
            .optional()?;
        if existing.is_some() {
            return Err(KeyError::KeyConflict(api_key.to_string()));
        }
        tx.execute(
            "INSERT INTO keys (api_key, data, parent) VALUES (?1, ?2, ?3)",
            rusqlite::params![api_key, serialized, parent],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn get_key(&mut self, api_key: &str) -> Result<Key, KeyError> {
        let conn = self.conn()?;
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM keys WHERE api_key = ?1",
                [api_key],
                |row| row.get(0),
            )
            .optional()?;
        match data {
            Some(data) => Self::row_to_key(api_key, &data),
            None => Err(KeyError::KeyNotFound(api_key.to_string())),
        }
    }

    fn delete_key(&mut self, api_key: &str) -> Result<(), KeyError> {
        let conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM keys WHERE api_key = ?1", [api_key])?;
        tx.commit()?;
        Ok(())
    }

    fn has_key(&mut self, api_key: &str) -> Result<bool, KeyError> {
        match self.get_key(api_key) {
            Ok(_) => Ok(true),
            Err(KeyError::KeyNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn all_subkeys(&mut self, api_key: &str) -> Result<Vec<Key>, KeyError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT api_key, data FROM keys WHERE parent = ?1")?;
        let rows = stmt.query_map([api_key], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut keys = Vec::new();
        for row in rows {
            let (child, data) = row?;
            keys.push(Self::row_to_key(&child, &data)?);
        }
        Ok(keys)
    }
}

#[cfg(test)]
#[path = "sqlite_tests.rs"]
mod tests;
