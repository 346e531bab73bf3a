// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The key manager: a bounded LRU cache in front of the durable backend,
//! cascade deletion through the parent tree, and `open`/`close`/`set`/
//! `delete` events for observers.

use crate::backend::{open_backend, KeyBackend, KeysConfig};
use crate::error::KeyError;
use crate::key::{Key, KeyData};
use gaffer_core::{EventEmitter, SubscriptionId, Topic};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Number of keys kept in memory; the least-recently-used entry is
/// evicted when the 1001st distinct key is read.
pub const CACHE_CAPACITY: usize = 1000;

/// Events published by the key manager.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KeyEvent {
    Open,
    Close,
    Set { api_key: String },
    Delete { api_key: String },
}

impl Topic for KeyEvent {
    fn topic(&self) -> &'static str {
        match self {
            KeyEvent::Open => "open",
            KeyEvent::Close => "close",
            KeyEvent::Set { .. } => "set",
            KeyEvent::Delete { .. } => "delete",
        }
    }
}

pub struct KeyManager {
    backend: Mutex<Box<dyn KeyBackend>>,
    cache: Mutex<LruCache<String, Key>>,
    emitter: Arc<EventEmitter<KeyEvent>>,
}

impl KeyManager {
    /// Build a manager over the backend named in the configuration.
    pub fn new(cfg: &KeysConfig) -> Result<Self, KeyError> {
        Ok(Self::with_backend(open_backend(cfg)?))
    }

    pub fn with_backend(backend: Box<dyn KeyBackend>) -> Self {
        Self::with_capacity(backend, CACHE_CAPACITY)
    }

    fn with_capacity(backend: Box<dyn KeyBackend>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            backend: Mutex::new(backend),
            cache: Mutex::new(LruCache::new(capacity)),
            emitter: Arc::new(EventEmitter::new()),
        }
    }

    pub fn subscribe<F>(&self, topic: &str, listener: F) -> SubscriptionId
    where
        F: Fn(&KeyEvent) -> Result<(), gaffer_core::BoxError> + Send + Sync + 'static,
    {
        self.emitter.subscribe(topic, listener)
    }

    pub fn unsubscribe(&self, topic: &str, id: SubscriptionId) {
        self.emitter.unsubscribe(topic, id);
    }

    /// Open the durable backend and publish `open`.
    pub fn open(&self) -> Result<(), KeyError> {
        self.backend.lock().open()?;
        self.emitter.publish(&KeyEvent::Open);
        Ok(())
    }

    /// Publish `close`, close the backend, and drop the cache and all
    /// subscriptions.
    pub fn close(&self) -> Result<(), KeyError> {
        self.emitter.publish(&KeyEvent::Close);
        let result = self.backend.lock().close();
        self.cache.lock().clear();
        self.emitter.close();
        result
    }

    pub fn all_keys(&self) -> Result<Vec<Key>, KeyError> {
        self.backend.lock().all_keys()
    }

    /// Insert a new key row. Fails `KeyConflict` when the api_key exists
    /// and `KeyNotFound` when a named parent does not.
    pub fn set_key(
        &self,
        api_key: &str,
        data: &KeyData,
        parent: Option<&str>,
    ) -> Result<(), KeyError> {
        let value = serde_json::to_value(data)?;
        self.backend.lock().set_key(api_key, &value, parent)?;
        self.emitter.publish(&KeyEvent::Set {
            api_key: api_key.to_string(),
        });
        Ok(())
    }

    /// Fetch a key, promoting it in the cache. A miss reads the backend
    /// and populates the cache, evicting the least-recently-used entry
    /// at capacity.
    pub fn get_key(&self, api_key: &str) -> Result<Key, KeyError> {
        if let Some(key) = self.cache.lock().get(api_key) {
            return Ok(key.clone());
        }
        let key = self.backend.lock().get_key(api_key)?;
        self.cache.lock().put(api_key.to_string(), key.clone());
        Ok(key)
    }

    /// Boolean probe; never raises for an absent key.
    pub fn has_key(&self, api_key: &str) -> Result<bool, KeyError> {
        self.backend.lock().has_key(api_key)
    }

    /// Delete a key and every descendant, evicting all of them from the
    /// cache, then publish `delete` with the root api_key.
    pub fn delete_key(&self, api_key: &str) -> Result<(), KeyError> {
        let doomed = {
            let mut backend = self.backend.lock();
            if !backend.has_key(api_key)? {
                return Err(KeyError::KeyNotFound(api_key.to_string()));
            }
            let mut doomed = vec![api_key.to_string()];
            let mut queue = vec![api_key.to_string()];
            while let Some(current) = queue.pop() {
                for child in backend.all_subkeys(&current)? {
                    doomed.push(child.api_key().to_string());
                    queue.push(child.api_key().to_string());
                }
            }
            {
                let mut cache = self.cache.lock();
                for key in &doomed {
                    cache.pop(key);
                }
            }
            for key in &doomed {
                backend.delete_key(key)?;
            }
            doomed
        };
        tracing::debug!(api_key, cascaded = doomed.len() - 1, "deleted key");
        self.emitter.publish(&KeyEvent::Delete {
            api_key: api_key.to_string(),
        });
        Ok(())
    }

    #[cfg(test)]
    fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }

    #[cfg(test)]
    fn cache_contains(&self, api_key: &str) -> bool {
        self.cache.lock().contains(api_key)
    }
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager")
            .field("cached", &self.cache.lock().len())
            .finish()
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
