// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    bare = { "nginx", DEFAULT_GROUP, "nginx", "nginx" },
    grouped = { "web.nginx", "web", "nginx", "web.nginx" },
    dotted_name = { "web.nginx.backup", "web", "nginx.backup", "web.nginx.backup" },
    explicit_default = { "default.nginx", DEFAULT_GROUP, "nginx", "nginx" },
)]
fn parse_and_display(input: &str, group: &str, name: &str, display: &str) {
    let parsed = JobName::parse(input).unwrap();
    assert_eq!(parsed.group(), group);
    assert_eq!(parsed.name(), name);
    assert_eq!(parsed.to_string(), display);
    assert_eq!(parsed.scope(), display);
}

#[parameterized(
    empty = { "" },
    empty_name = { "web." },
    empty_group = { ".nginx" },
)]
fn parse_rejects(input: &str) {
    assert!(JobName::parse(input).is_err());
}

#[test]
fn new_rejects_dotted_group() {
    assert!(JobName::new("a.b", "job").is_err());
}

#[test]
fn display_round_trips_through_serde() {
    let name = JobName::parse("web.nginx").unwrap();
    let json = serde_json::to_string(&name).unwrap();
    assert_eq!(json, "\"web.nginx\"");
    let back: JobName = serde_json::from_str(&json).unwrap();
    assert_eq!(back, name);

    let bare = JobName::parse("nginx").unwrap();
    assert_eq!(serde_json::to_string(&bare).unwrap(), "\"nginx\"");
}

#[test]
fn spec_defaults() {
    let spec: JobSpec = serde_json::from_str(r#"{"cmd": "/bin/sleep"}"#).unwrap();
    assert_eq!(spec.cmd, "/bin/sleep");
    assert!(spec.args.is_empty());
    assert!(spec.env.is_empty());
    assert_eq!(spec.numprocesses, 1);
    assert!(spec.start);
    assert!(!spec.detach);
    assert_eq!(spec.uid, None);
}

#[test]
fn spec_builder() {
    let spec = JobSpec::new("/bin/sleep")
        .with_args(["60"])
        .with_numprocesses(3)
        .with_start(false)
        .with_env("PORT", "8000");
    assert_eq!(spec.args, vec!["60"]);
    assert_eq!(spec.numprocesses, 3);
    assert!(!spec.start);
    assert_eq!(spec.env.get("PORT").map(String::as_str), Some("8000"));
}

#[test]
fn spec_round_trips() {
    let spec = JobSpec::new("/usr/bin/env")
        .with_args(["true"])
        .with_env("A", "1")
        .with_env("B", "2");
    let json = serde_json::to_string(&spec).unwrap();
    let back: JobSpec = serde_json::from_str(&json).unwrap();
    assert_eq!(back, spec);
}
