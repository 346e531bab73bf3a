// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job naming and the job specification record.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Group used when a job is declared without one.
pub const DEFAULT_GROUP: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("invalid job name: {0:?}")]
    Invalid(String),
}

/// Identity of a job: `(group, name)`.
///
/// The textual form is `group.name`; a job in the default group is
/// addressed by its bare name. Groups cannot contain a dot (the split is
/// at the first one), names can. The textual form is also the scope
/// string consulted by permission checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobName {
    group: String,
    name: String,
}

impl JobName {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Result<Self, NameError> {
        let group = group.into();
        let name = name.into();
        if group.is_empty() || group.contains('.') || name.is_empty() {
            return Err(NameError::Invalid(format!("{group}.{name}")));
        }
        Ok(Self { group, name })
    }

    /// Parse the textual form: `group.name`, or a bare name in the
    /// default group.
    pub fn parse(s: &str) -> Result<Self, NameError> {
        match s.split_once('.') {
            Some((group, name)) => Self::new(group, name),
            None => Self::new(DEFAULT_GROUP, s),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_default_group(&self) -> bool {
        self.group == DEFAULT_GROUP
    }

    /// The scope string permission checks evaluate against.
    pub fn scope(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default_group() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}.{}", self.group, self.name)
        }
    }
}

impl FromStr for JobName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for JobName {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for JobName {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

fn default_numprocesses() -> u32 {
    1
}

fn default_start() -> bool {
    true
}

/// Command template plus supervision parameters for one job.
///
/// The template half (`cmd` through `detach`) is cloned into every spawn;
/// `numprocesses` and `start` drive the manager's reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub cmd: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gid: Option<u32>,
    #[serde(default)]
    pub detach: bool,
    #[serde(default = "default_numprocesses")]
    pub numprocesses: u32,
    #[serde(default = "default_start")]
    pub start: bool,
}

impl JobSpec {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            args: Vec::new(),
            env: IndexMap::new(),
            cwd: None,
            uid: None,
            gid: None,
            detach: false,
            numprocesses: 1,
            start: true,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_numprocesses(mut self, numprocesses: u32) -> Self {
        self.numprocesses = numprocesses;
        self
    }

    pub fn with_start(mut self, start: bool) -> Self {
        self.start = start;
        self
    }

    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
