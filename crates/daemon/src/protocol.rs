// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire protocol for the control plane.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload. Every
//! request carries an optional `api_key`; error responses carry the HTTP
//! status code the fronting transport maps them to.

use gaffer_core::{Event, JobSpec};
use gaffer_keys::{KeyData, KeyError};
use gaffer_supervisor::{JobSnapshot, SupervisorError};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

/// Maximum message size (8 MB).
pub const MAX_MESSAGE_SIZE: usize = 8 * 1024 * 1024;

/// Default I/O timeout for one request or response frame.
pub const DEFAULT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Protocol version (from Cargo.toml).
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timeout")]
    Timeout,
}

/// One client request: optional credential plus the operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(flatten)]
    pub op: Op,
}

impl Request {
    pub fn new(op: Op) -> Self {
        Self { api_key: None, op }
    }

    pub fn with_key(api_key: impl Into<String>, op: Op) -> Self {
        Self {
            api_key: Some(api_key.into()),
            op,
        }
    }
}

/// Operations the control plane serves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    Ping,
    Status,
    ListJobs {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        group: Option<String>,
    },
    GetJob {
        name: String,
    },
    AddJob {
        name: String,
        spec: JobSpec,
    },
    RemoveJob {
        name: String,
    },
    UpdateNumprocesses {
        name: String,
        numprocesses: u32,
    },
    StartJob {
        name: String,
    },
    StopJob {
        name: String,
    },
    /// Stream event frames until the client disconnects. Empty topic
    /// list means every topic.
    Watch {
        #[serde(default)]
        topics: Vec<String>,
    },
    ListKeys,
    GetKeyInfo {
        api_key: String,
    },
    SetKey {
        api_key: String,
        #[serde(default)]
        data: KeyData,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent: Option<String>,
    },
    DeleteKey {
        api_key: String,
    },
    Shutdown,
}

/// Server responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Response {
    Pong,
    Ok,
    Status {
        version: String,
        uptime_secs: u64,
        jobs: usize,
        processes: usize,
    },
    Jobs {
        jobs: Vec<JobSnapshot>,
    },
    Job {
        job: JobSnapshot,
    },
    Keys {
        keys: Vec<serde_json::Value>,
    },
    KeyInfo {
        key: serde_json::Value,
    },
    /// One frame of a `Watch` stream.
    Event {
        event: Event,
    },
    ShuttingDown,
    Error {
        status: u16,
        kind: String,
        message: String,
    },
}

impl Response {
    pub fn error(status: u16, kind: &str, message: impl Into<String>) -> Self {
        Response::Error {
            status,
            kind: kind.to_string(),
            message: message.into(),
        }
    }

    pub fn unauthorized() -> Self {
        Self::error(401, "unauthorized", "missing or unknown api key")
    }

    pub fn forbidden(what: &str) -> Self {
        Self::error(403, "forbidden", format!("permission denied: {what}"))
    }

    pub fn from_supervisor_error(e: &SupervisorError) -> Self {
        match e {
            SupervisorError::JobExists(_) => Self::error(409, "job_exists", e.to_string()),
            SupervisorError::JobNotFound(_) => Self::error(404, "job_not_found", e.to_string()),
            SupervisorError::Name(_) => Self::error(400, "invalid_name", e.to_string()),
            SupervisorError::SpawnFailed { .. } => Self::error(500, "spawn_failed", e.to_string()),
            SupervisorError::SignalFailed { .. } | SupervisorError::ManagerClosed => {
                Self::error(500, "internal", e.to_string())
            }
        }
    }

    pub fn from_key_error(e: &KeyError) -> Self {
        match e {
            KeyError::KeyNotFound(_) => Self::error(404, "key_not_found", e.to_string()),
            KeyError::KeyConflict(_) => Self::error(409, "key_conflict", e.to_string()),
            KeyError::InvalidKey => Self::error(400, "invalid_key", e.to_string()),
            KeyError::UnknownPermission(_) => {
                Self::error(500, "unknown_permission", e.to_string())
            }
            KeyError::UnknownBackend(_)
            | KeyError::BackendClosed
            | KeyError::Backend(_)
            | KeyError::Serialize(_) => Self::error(500, "internal", e.to_string()),
        }
    }
}

/// Encode a message to JSON bytes (without the length prefix).
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
    let json = serde_json::to_vec(msg)?;
    if json.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: json.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(json)
}

/// Decode a message from JSON bytes.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Read a length-prefixed message from an async reader.
pub async fn read_message<R: tokio::io::AsyncReadExt + Unpin>(
    reader: &mut R,
) -> Result<Vec<u8>, ProtocolError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed);
        }
        Err(e) => return Err(ProtocolError::Io(e)),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Write a length-prefixed message to an async writer.
pub async fn write_message<W: tokio::io::AsyncWriteExt + Unpin>(
    writer: &mut W,
    data: &[u8],
) -> Result<(), ProtocolError> {
    let len = data.len();
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }
    writer.write_all(&(len as u32).to_be_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a request with a timeout.
pub async fn read_request<R: tokio::io::AsyncReadExt + Unpin>(
    reader: &mut R,
    timeout: std::time::Duration,
) -> Result<Request, ProtocolError> {
    let bytes = tokio::time::timeout(timeout, read_message(reader))
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    decode(&bytes)
}

/// Write a response with a timeout.
pub async fn write_response<W: tokio::io::AsyncWriteExt + Unpin>(
    writer: &mut W,
    response: &Response,
    timeout: std::time::Duration,
) -> Result<(), ProtocolError> {
    let data = encode(response)?;
    tokio::time::timeout(timeout, write_message(writer, &data))
        .await
        .map_err(|_| ProtocolError::Timeout)?
}

/// Read a response with a timeout (client side).
pub async fn read_response<R: tokio::io::AsyncReadExt + Unpin>(
    reader: &mut R,
    timeout: std::time::Duration,
) -> Result<Response, ProtocolError> {
    let bytes = tokio::time::timeout(timeout, read_message(reader))
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    decode(&bytes)
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
