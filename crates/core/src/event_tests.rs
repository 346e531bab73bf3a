// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::job::JobName;

fn web_nginx() -> JobName {
    JobName::parse("web.nginx").unwrap()
}

#[test]
fn topic_matches_serialized_tag() {
    let events = [
        Event::Start { job: web_nginx() },
        Event::Spawn {
            job: web_nginx(),
            pid: 42,
        },
        Event::Exit {
            job: web_nginx(),
            pid: 42,
            status: ExitStatus {
                code: Some(0),
                signal: None,
            },
        },
        Event::Stop { job: web_nginx() },
        Event::Update {
            job: web_nginx(),
            numprocesses: 4,
        },
        Event::Flapping { job: web_nginx() },
        Event::SpawnError {
            job: web_nginx(),
            error: "No such file or directory".to_string(),
        },
        Event::Shutdown,
    ];

    for event in events {
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], event.topic());
        assert!(Event::TOPICS.contains(&event.topic()));
    }
}

#[test]
fn exit_event_round_trips() {
    let event = Event::Exit {
        job: web_nginx(),
        pid: 31337,
        status: ExitStatus {
            code: None,
            signal: Some(15),
        },
    };
    let json = serde_json::to_string(&event).unwrap();
    let parsed: Event = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, event);
}

#[test]
fn job_accessor() {
    assert_eq!(
        Event::Start { job: web_nginx() }.job(),
        Some(&web_nginx())
    );
    assert_eq!(Event::Shutdown.job(), None);
}

#[test]
fn exit_status_success() {
    let clean = ExitStatus {
        code: Some(0),
        signal: None,
    };
    assert!(clean.success());

    let failed = ExitStatus {
        code: Some(1),
        signal: None,
    };
    assert!(!failed.success());

    let killed = ExitStatus {
        code: None,
        signal: Some(9),
    };
    assert!(!killed.success());
    assert_eq!(killed.to_string(), "signal 9");
}
