// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener tasks for the socket endpoints.
//!
//! Each endpoint runs an accept loop in a spawned task; connections are
//! handled concurrently without blocking the manager loop. Every request
//! is authenticated against the key store (or handed the dummy key when
//! auth is disabled) and authorized per operation before dispatch.

use crate::protocol::{self, Op, Response, DEFAULT_TIMEOUT, PROTOCOL_VERSION};
use gaffer_core::Event;
use gaffer_keys::{Key, KeyError, KeyManager, Permission};
use gaffer_supervisor::ManagerHandle;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Shared daemon context for all request handlers.
pub(crate) struct ListenCtx {
    pub manager: ManagerHandle,
    pub keys: Arc<KeyManager>,
    /// When false, requests are served under the dummy key.
    pub auth: bool,
    pub started_at: Instant,
}

/// Bound socket an endpoint accepts connections on.
pub(crate) enum Acceptor {
    Unix(UnixListener),
    Tcp(TcpListener),
}

/// Accept loop for one endpoint.
pub(crate) struct Listener {
    endpoint: String,
    acceptor: Acceptor,
    ctx: Arc<ListenCtx>,
}

impl Listener {
    pub fn new(endpoint: String, acceptor: Acceptor, ctx: Arc<ListenCtx>) -> Self {
        Self {
            endpoint,
            acceptor,
            ctx,
        }
    }

    /// Run until the daemon exits, spawning a task per connection.
    pub async fn run(self) {
        loop {
            match &self.acceptor {
                Acceptor::Unix(listener) => match listener.accept().await {
                    Ok((stream, _)) => self.spawn_connection(stream),
                    Err(e) => error!(endpoint = %self.endpoint, "accept error: {e}"),
                },
                Acceptor::Tcp(listener) => match listener.accept().await {
                    Ok((stream, peer)) => {
                        debug!(endpoint = %self.endpoint, %peer, "connection accepted");
                        self.spawn_connection(stream);
                    }
                    Err(e) => error!(endpoint = %self.endpoint, "accept error: {e}"),
                },
            }
        }
    }

    fn spawn_connection<S>(&self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, &ctx).await {
                match e {
                    protocol::ProtocolError::ConnectionClosed => debug!("client disconnected"),
                    protocol::ProtocolError::Timeout => warn!("connection timeout"),
                    _ => error!("connection error: {e}"),
                }
            }
        });
    }
}

/// Handle a single client connection: one request, one response, with
/// `watch` instead streaming event frames until disconnect.
async fn handle_connection<S>(stream: S, ctx: &ListenCtx) -> Result<(), protocol::ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let (mut reader, mut writer) = tokio::io::split(stream);

    let request = protocol::read_request(&mut reader, DEFAULT_TIMEOUT).await?;
    debug!(request = ?request.op, "received request");

    let key = match resolve_key(ctx, request.api_key.as_deref()) {
        Ok(key) => key,
        Err(response) => {
            return protocol::write_response(&mut writer, &response, DEFAULT_TIMEOUT).await;
        }
    };
    if let Err(response) = authorize(&key, &request.op) {
        return protocol::write_response(&mut writer, &response, DEFAULT_TIMEOUT).await;
    }

    match request.op {
        Op::Watch { topics } => watch(ctx, topics, writer).await,
        op => {
            let response = dispatch(op, ctx).await;
            protocol::write_response(&mut writer, &response, DEFAULT_TIMEOUT).await
        }
    }
}

/// Resolve the request credential to a key. With auth disabled every
/// request runs under the dummy key.
fn resolve_key(ctx: &ListenCtx, api_key: Option<&str>) -> Result<Key, Response> {
    if !ctx.auth {
        return Ok(Key::dummy());
    }
    let Some(api_key) = api_key else {
        return Err(Response::unauthorized());
    };
    match ctx.keys.get_key(api_key) {
        Ok(key) => Ok(key),
        Err(KeyError::KeyNotFound(_)) => Err(Response::unauthorized()),
        Err(e) => {
            error!("key lookup failed: {e}");
            Err(Response::from_key_error(&e))
        }
    }
}

/// Per-operation permission mapping: job reads need `read` on the job
/// scope, job mutations need `manage`, key operations need the
/// key-minting capability, listing every key needs superuser.
fn authorize(key: &Key, op: &Op) -> Result<(), Response> {
    let allowed = match op {
        Op::Ping | Op::Status => true,
        Op::ListJobs { group: Some(group) } => key.can(Permission::Read, group),
        Op::ListJobs { group: None } | Op::Watch { .. } => key.can(Permission::Read, "*"),
        Op::GetJob { name } => key.can(Permission::Read, name),
        Op::AddJob { name, .. }
        | Op::RemoveJob { name }
        | Op::UpdateNumprocesses { name, .. }
        | Op::StartJob { name }
        | Op::StopJob { name } => key.can(Permission::Manage, name),
        Op::SetKey { .. } | Op::DeleteKey { .. } | Op::GetKeyInfo { .. } => key.can_create_key(),
        Op::ListKeys => key.is_superuser(),
        Op::Shutdown => key.can(Permission::Manage, "*"),
    };
    if allowed {
        Ok(())
    } else {
        Err(Response::forbidden(op_name(op)))
    }
}

fn op_name(op: &Op) -> &'static str {
    match op {
        Op::Ping => "ping",
        Op::Status => "status",
        Op::ListJobs { .. } => "list_jobs",
        Op::GetJob { .. } => "get_job",
        Op::AddJob { .. } => "add_job",
        Op::RemoveJob { .. } => "remove_job",
        Op::UpdateNumprocesses { .. } => "update_numprocesses",
        Op::StartJob { .. } => "start_job",
        Op::StopJob { .. } => "stop_job",
        Op::Watch { .. } => "watch",
        Op::ListKeys => "list_keys",
        Op::GetKeyInfo { .. } => "get_key",
        Op::SetKey { .. } => "set_key",
        Op::DeleteKey { .. } => "delete_key",
        Op::Shutdown => "shutdown",
    }
}

async fn dispatch(op: Op, ctx: &ListenCtx) -> Response {
    match op {
        Op::Ping => Response::Pong,

        Op::Status => match ctx.manager.list_jobs(None).await {
            Ok(jobs) => Response::Status {
                version: PROTOCOL_VERSION.to_string(),
                uptime_secs: ctx.started_at.elapsed().as_secs(),
                jobs: jobs.len(),
                processes: jobs.iter().map(|j| j.pids.len()).sum(),
            },
            Err(e) => Response::from_supervisor_error(&e),
        },

        Op::ListJobs { group } => match ctx.manager.list_jobs(group.as_deref()).await {
            Ok(jobs) => Response::Jobs { jobs },
            Err(e) => Response::from_supervisor_error(&e),
        },

        Op::GetJob { name } => match ctx.manager.get_job(&name).await {
            Ok(job) => Response::Job { job },
            Err(e) => Response::from_supervisor_error(&e),
        },

        Op::AddJob { name, spec } => match ctx.manager.add_job(&name, spec).await {
            Ok(()) => Response::Ok,
            Err(e) => Response::from_supervisor_error(&e),
        },

        Op::RemoveJob { name } => match ctx.manager.remove_job(&name).await {
            Ok(()) => Response::Ok,
            Err(e) => Response::from_supervisor_error(&e),
        },

        Op::UpdateNumprocesses { name, numprocesses } => {
            match ctx.manager.update_numprocesses(&name, numprocesses).await {
                Ok(()) => Response::Ok,
                Err(e) => Response::from_supervisor_error(&e),
            }
        }

        Op::StartJob { name } => match ctx.manager.start_job(&name).await {
            Ok(()) => Response::Ok,
            Err(e) => Response::from_supervisor_error(&e),
        },

        Op::StopJob { name } => match ctx.manager.stop_job(&name).await {
            Ok(()) => Response::Ok,
            Err(e) => Response::from_supervisor_error(&e),
        },

        Op::ListKeys => match ctx.keys.all_keys() {
            Ok(keys) => Response::Keys {
                keys: keys.iter().map(Key::dump).collect(),
            },
            Err(e) => Response::from_key_error(&e),
        },

        Op::GetKeyInfo { api_key } => match ctx.keys.get_key(&api_key) {
            Ok(key) => Response::KeyInfo { key: key.dump() },
            Err(e) => Response::from_key_error(&e),
        },

        Op::SetKey {
            api_key,
            data,
            parent,
        } => match ctx.keys.set_key(&api_key, &data, parent.as_deref()) {
            Ok(()) => Response::Ok,
            Err(e) => Response::from_key_error(&e),
        },

        Op::DeleteKey { api_key } => match ctx.keys.delete_key(&api_key) {
            Ok(()) => Response::Ok,
            Err(e) => Response::from_key_error(&e),
        },

        Op::Shutdown => {
            ctx.manager.request_shutdown();
            Response::ShuttingDown
        }

        // handled before dispatch
        Op::Watch { .. } => Response::error(500, "internal", "watch is a streaming operation"),
    }
}

/// Relay manager events to the client until it disconnects or the
/// emitter closes at shutdown.
async fn watch<W>(
    ctx: &ListenCtx,
    topics: Vec<String>,
    mut writer: tokio::io::WriteHalf<W>,
) -> Result<(), protocol::ProtocolError>
where
    W: AsyncWrite,
{
    let topics = if topics.is_empty() {
        Event::TOPICS.iter().map(|t| t.to_string()).collect()
    } else {
        topics
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let mut subscriptions = Vec::new();
    for topic in &topics {
        let tx = tx.clone();
        let id = ctx.manager.subscribe(topic, move |event: &Event| {
            tx.send(event.clone())
                .map_err(|_| "watch client gone".into())
        });
        subscriptions.push((topic.clone(), id));
    }
    drop(tx);

    // ack before the first frame so clients can tell the stream is live
    protocol::write_response(&mut writer, &Response::Ok, DEFAULT_TIMEOUT).await?;

    let result = loop {
        match rx.recv().await {
            Some(event) => {
                let frame = Response::Event { event };
                if let Err(e) =
                    protocol::write_response(&mut writer, &frame, DEFAULT_TIMEOUT).await
                {
                    debug!("watch stream ended: {e}");
                    break Ok(());
                }
            }
            // emitter closed: the daemon is shutting down
            None => break writer.shutdown().await.map_err(Into::into),
        }
    };

    for (topic, id) in subscriptions {
        ctx.manager.unsubscribe(&topic, id);
    }
    result
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
