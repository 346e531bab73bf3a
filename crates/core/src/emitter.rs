// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-topic event fan-out.
//!
//! Listeners register against exact topic strings (no wildcard matching)
//! and are invoked synchronously in subscription order. A failing listener
//! is logged and skipped; it never prevents later listeners from running
//! and never reaches the publisher.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Error type listeners may return; swallowed by the emitter after logging.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type ListenerFn<E> = dyn Fn(&E) -> Result<(), BoxError> + Send + Sync;

/// Anything publishable through an [`EventEmitter`].
pub trait Topic {
    /// The exact topic string this event is delivered under.
    fn topic(&self) -> &'static str;
}

/// Handle returned by `subscribe`, consumed by `unsubscribe`.
///
/// Closures have no identity in Rust, so removal is by id rather than by
/// listener value. Registering the same closure twice yields two distinct
/// ids and two invocations per publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription<E> {
    id: SubscriptionId,
    listener: Arc<ListenerFn<E>>,
}

struct Inner<E> {
    topics: HashMap<String, Vec<Subscription<E>>>,
    next_id: u64,
    closed: bool,
}

/// Event emitter with per-topic subscriber lists.
///
/// Subscription changes and publishes may interleave freely: `publish`
/// snapshots the subscriber list under the lock and invokes the callbacks
/// outside it, so delivery reflects the subscriber set at the moment of
/// the call.
pub struct EventEmitter<E> {
    inner: Mutex<Inner<E>>,
}

impl<E: Topic> EventEmitter<E> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                topics: HashMap::new(),
                next_id: 0,
                closed: false,
            }),
        }
    }

    /// Register a listener for an exact topic string.
    pub fn subscribe<F>(&self, topic: &str, listener: F) -> SubscriptionId
    where
        F: Fn(&E) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        if inner.closed {
            tracing::debug!(topic, "subscribe on closed emitter ignored");
            return id;
        }
        inner
            .topics
            .entry(topic.to_string())
            .or_default()
            .push(Subscription {
                id,
                listener: Arc::new(listener),
            });
        id
    }

    /// Remove one registration. No-op when the id is absent.
    pub fn unsubscribe(&self, topic: &str, id: SubscriptionId) {
        let mut inner = self.inner.lock();
        if let Some(subs) = inner.topics.get_mut(topic) {
            subs.retain(|s| s.id != id);
            if subs.is_empty() {
                inner.topics.remove(topic);
            }
        }
    }

    /// Deliver an event to every current subscriber of its topic,
    /// in subscription order.
    pub fn publish(&self, event: &E) {
        let listeners: Vec<Arc<ListenerFn<E>>> = {
            let inner = self.inner.lock();
            if inner.closed {
                return;
            }
            match inner.topics.get(event.topic()) {
                Some(subs) => subs.iter().map(|s| Arc::clone(&s.listener)).collect(),
                None => return,
            }
        };
        for listener in listeners {
            if let Err(e) = listener(event) {
                tracing::warn!(topic = event.topic(), error = %e, "event listener failed");
            }
        }
    }

    /// Drop all subscriptions. Further publishes and subscribes are no-ops.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.topics.clear();
        inner.closed = true;
    }

    /// Number of live subscriptions for a topic.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner.lock().topics.get(topic).map_or(0, Vec::len)
    }
}

impl<E: Topic> Default for EventEmitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for EventEmitter<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("EventEmitter")
            .field("topics", &inner.topics.len())
            .field("closed", &inner.closed)
            .finish()
    }
}

#[cfg(test)]
#[path = "emitter_tests.rs"]
mod tests;
