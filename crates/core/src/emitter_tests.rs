// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, PartialEq)]
struct Ping(&'static str);

impl Topic for Ping {
    fn topic(&self) -> &'static str {
        self.0
    }
}

fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, tag: &'static str) -> impl Fn(&Ping) -> Result<(), BoxError> {
    let log = Arc::clone(log);
    move |_| {
        log.lock().push(tag);
        Ok(())
    }
}

#[test]
fn delivers_in_subscription_order() {
    let emitter = EventEmitter::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    emitter.subscribe("tick", recorder(&log, "first"));
    emitter.subscribe("tick", recorder(&log, "second"));
    emitter.subscribe("tick", recorder(&log, "third"));

    emitter.publish(&Ping("tick"));

    assert_eq!(*log.lock(), vec!["first", "second", "third"]);
}

#[test]
fn topics_are_exact_strings() {
    let emitter = EventEmitter::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    emitter.subscribe("tick", recorder(&log, "tick"));

    emitter.publish(&Ping("tock"));
    assert!(log.lock().is_empty());

    emitter.publish(&Ping("tick"));
    assert_eq!(*log.lock(), vec!["tick"]);
}

#[test]
fn same_listener_twice_runs_twice() {
    let emitter = EventEmitter::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let listener = {
        let hits = Arc::clone(&hits);
        move |_: &Ping| {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    };
    let a = emitter.subscribe("tick", listener.clone());
    let b = emitter.subscribe("tick", listener);
    assert_ne!(a, b);

    emitter.publish(&Ping("tick"));
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[test]
fn unsubscribe_removes_one_registration() {
    let emitter = EventEmitter::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let first = emitter.subscribe("tick", recorder(&log, "first"));
    emitter.subscribe("tick", recorder(&log, "second"));

    emitter.unsubscribe("tick", first);
    emitter.publish(&Ping("tick"));

    assert_eq!(*log.lock(), vec!["second"]);
}

#[test]
fn unsubscribe_absent_is_noop() {
    let emitter = EventEmitter::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let id = emitter.subscribe("tick", recorder(&log, "kept"));

    emitter.unsubscribe("tock", id);
    emitter.unsubscribe("tick", SubscriptionId(9999));
    emitter.publish(&Ping("tick"));

    assert_eq!(*log.lock(), vec!["kept"]);
}

#[test]
fn listener_failure_does_not_stop_later_listeners() {
    let emitter = EventEmitter::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    emitter.subscribe("tick", |_: &Ping| -> Result<(), BoxError> {
        Err("listener broke".into())
    });
    emitter.subscribe("tick", recorder(&log, "survivor"));

    emitter.publish(&Ping("tick"));

    assert_eq!(*log.lock(), vec!["survivor"]);
}

#[test]
fn subscriber_added_during_publish_sees_next_publish_only() {
    let emitter = Arc::new(EventEmitter::new());
    let log = Arc::new(Mutex::new(Vec::new()));
    {
        let emitter2 = Arc::clone(&emitter);
        let log2 = Arc::clone(&log);
        emitter.subscribe("tick", move |_: &Ping| {
            let log3 = Arc::clone(&log2);
            emitter2.subscribe("tick", move |_: &Ping| {
                log3.lock().push("late");
                Ok(())
            });
            Ok(())
        });
    }

    emitter.publish(&Ping("tick"));
    assert!(log.lock().is_empty(), "snapshot at publish time");

    emitter.publish(&Ping("tick"));
    assert_eq!(*log.lock(), vec!["late"]);
}

#[test]
fn close_drops_all_subscriptions() {
    let emitter = EventEmitter::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    emitter.subscribe("tick", recorder(&log, "gone"));

    emitter.close();
    emitter.publish(&Ping("tick"));
    assert!(log.lock().is_empty());
    assert_eq!(emitter.subscriber_count("tick"), 0);

    // subscribing after close is inert
    emitter.subscribe("tick", recorder(&log, "never"));
    emitter.publish(&Ping("tick"));
    assert!(log.lock().is_empty());
}
