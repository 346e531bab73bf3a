// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use gaffer_core::JobName;
use gaffer_keys::KeyError;
use gaffer_supervisor::SupervisorError;
use yare::parameterized;

#[test]
fn request_round_trips_with_api_key() {
    let request = Request::with_key(
        "secret",
        Op::AddJob {
            name: "web.nginx".to_string(),
            spec: gaffer_core::JobSpec::new("/usr/sbin/nginx").with_numprocesses(2),
        },
    );
    let bytes = encode(&request).unwrap();
    let back: Request = decode(&bytes).unwrap();
    assert_eq!(back, request);

    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["op"], "add_job");
    assert_eq!(value["api_key"], "secret");
}

#[test]
fn request_without_key_omits_the_field() {
    let bytes = encode(&Request::new(Op::Ping)).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["op"], "ping");
    assert!(value.get("api_key").is_none());

    let back: Request = decode(&bytes).unwrap();
    assert_eq!(back.api_key, None);
}

#[test]
fn response_round_trips() {
    let responses = [
        Response::Pong,
        Response::Ok,
        Response::ShuttingDown,
        Response::Event {
            event: gaffer_core::Event::Spawn {
                job: JobName::parse("web.nginx").unwrap(),
                pid: 42,
            },
        },
        Response::error(404, "job_not_found", "job not found: ghost"),
    ];
    for response in responses {
        let bytes = encode(&response).unwrap();
        let back: Response = decode(&bytes).unwrap();
        assert_eq!(back, response);
    }
}

#[parameterized(
    job_exists = { SupervisorError::JobExists(JobName::parse("a").unwrap()), 409 },
    job_not_found = { SupervisorError::JobNotFound("ghost".to_string()), 404 },
    invalid_name = { SupervisorError::Name(gaffer_core::NameError::Invalid(".".to_string())), 400 },
    manager_closed = { SupervisorError::ManagerClosed, 500 },
)]
fn supervisor_errors_map_to_status(error: SupervisorError, expected: u16) {
    match Response::from_supervisor_error(&error) {
        Response::Error { status, .. } => assert_eq!(status, expected),
        other => panic!("not an error response: {other:?}"),
    }
}

#[parameterized(
    not_found = { KeyError::KeyNotFound("k".to_string()), 404 },
    conflict = { KeyError::KeyConflict("k".to_string()), 409 },
    invalid = { KeyError::InvalidKey, 400 },
    unknown_permission = { KeyError::UnknownPermission("exec".to_string()), 500 },
)]
fn key_errors_map_to_status(error: KeyError, expected: u16) {
    match Response::from_key_error(&error) {
        Response::Error { status, .. } => assert_eq!(status, expected),
        other => panic!("not an error response: {other:?}"),
    }
}

#[tokio::test]
async fn wire_round_trip() {
    let (client, server) = tokio::io::duplex(1024);
    let (_, mut client_writer) = tokio::io::split(client);
    let (mut server_reader, _) = tokio::io::split(server);

    let request = Request::new(Op::ListJobs { group: None });
    let bytes = encode(&request).unwrap();
    write_message(&mut client_writer, &bytes).await.unwrap();

    let received = read_request(&mut server_reader, DEFAULT_TIMEOUT).await.unwrap();
    assert_eq!(received, request);
}

#[tokio::test]
async fn closed_connection_is_distinguished() {
    let (client, server) = tokio::io::duplex(1024);
    drop(client);
    let (mut server_reader, _) = tokio::io::split(server);

    let err = read_message(&mut server_reader).await.unwrap_err();
    assert!(matches!(err, ProtocolError::ConnectionClosed));
}

#[tokio::test]
async fn oversized_length_prefix_is_rejected() {
    let (client, server) = tokio::io::duplex(64);
    let (_, mut client_writer) = tokio::io::split(client);
    let (mut server_reader, _) = tokio::io::split(server);

    let huge = (MAX_MESSAGE_SIZE as u32 + 1).to_be_bytes();
    tokio::io::AsyncWriteExt::write_all(&mut client_writer, &huge)
        .await
        .unwrap();

    let err = read_message(&mut server_reader).await.unwrap_err();
    assert!(matches!(err, ProtocolError::MessageTooLarge { .. }));
}
