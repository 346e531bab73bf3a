// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! gaffer-keys: the API-key store and authorization decision point.
//!
//! Keys form a tree through parent pointers; deleting a key cascades to
//! every descendant. Permission grants are scoped to a session or a
//! `session.job` pair, with `manage` implying `write` implying `read`.
//! A bounded LRU cache sits in front of the durable backend.

pub mod backend;
pub mod error;
pub mod key;
pub mod manager;
pub mod sqlite;

pub use backend::{open_backend, KeyBackend, KeysConfig};
pub use error::KeyError;
pub use key::{Key, KeyData, Permission, Permissions};
pub use manager::{KeyEvent, KeyManager, CACHE_CAPACITY};
pub use sqlite::SqliteKeyBackend;
