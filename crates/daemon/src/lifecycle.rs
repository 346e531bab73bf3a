// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup and the controllers attached to the manager.
//!
//! Startup order: open the key store, bind every endpoint, attach the
//! signal and socket controllers, seed the declared jobs, and hand the
//! manager back to `main` to run.

use crate::config::{EndpointConfig, Bind, Settings};
use crate::listener::{Acceptor, ListenCtx, Listener};
use gaffer_keys::{KeyError, KeyManager};
use gaffer_supervisor::{Controller, Manager, ManagerHandle};
use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::net::{TcpSocket, UnixListener};
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error("key store error: {0}")]
    Keys(#[from] KeyError),

    #[error("failed to bind {endpoint}: {source}")]
    Bind {
        endpoint: String,
        source: std::io::Error,
    },
}

/// Everything `main` needs to run the daemon.
pub struct Server {
    pub manager: Manager,
    pub handle: ManagerHandle,
    pub keys: Arc<KeyManager>,
}

/// Build the daemon from loaded settings.
pub async fn startup(settings: &Settings) -> Result<Server, DaemonError> {
    let keys = Arc::new(KeyManager::new(&settings.keys)?);
    keys.open()?;

    let mut manager = Manager::new(settings.manager.clone());
    let handle = manager.handle();

    let mut acceptors = Vec::new();
    for endpoint in &settings.endpoints {
        if endpoint.tls_requested() {
            warn!(
                endpoint = %endpoint.name,
                "TLS termination is delegated to the fronting proxy; serving plaintext"
            );
        }
        let acceptor = bind_endpoint(endpoint).await?;
        info!(endpoint = %endpoint.name, bind = %endpoint.bind, "endpoint bound");
        acceptors.push((endpoint.name.clone(), acceptor));
    }

    manager.start(vec![
        Box::new(SignalController),
        Box::new(SocketController {
            acceptors,
            keys: Arc::clone(&keys),
            auth: settings.auth,
        }),
    ]);

    for (name, spec) in &settings.processes {
        if let Err(e) = manager.add_job(name.clone(), spec.clone()) {
            error!(job = %name, error = %e, "failed to add declared job");
        }
    }

    Ok(Server {
        manager,
        handle,
        keys,
    })
}

async fn bind_endpoint(endpoint: &EndpointConfig) -> Result<Acceptor, DaemonError> {
    let bind_err = |source| DaemonError::Bind {
        endpoint: endpoint.name.clone(),
        source,
    };
    match &endpoint.bind {
        Bind::Unix(path) => {
            // a leftover socket from a previous run would fail the bind
            if path.exists() {
                let _ = std::fs::remove_file(path);
            }
            Ok(Acceptor::Unix(UnixListener::bind(path).map_err(bind_err)?))
        }
        Bind::Tcp(addr) => {
            let resolved = addr
                .to_socket_addrs()
                .map_err(bind_err)?
                .next()
                .ok_or_else(|| {
                    bind_err(std::io::Error::other("address resolved to nothing"))
                })?;
            let socket = if resolved.is_ipv4() {
                TcpSocket::new_v4().map_err(bind_err)?
            } else {
                TcpSocket::new_v6().map_err(bind_err)?
            };
            socket.set_reuseaddr(true).map_err(bind_err)?;
            socket.bind(resolved).map_err(bind_err)?;
            let listener = socket.listen(endpoint.backlog).map_err(bind_err)?;
            Ok(Acceptor::Tcp(listener))
        }
    }
}

/// Translates SIGINT/SIGTERM into a shutdown request.
struct SignalController;

impl Controller for SignalController {
    fn attach(&mut self, handle: ManagerHandle) {
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    error!("failed to install SIGTERM handler: {e}");
                    return;
                }
            };
            let mut sigint = match signal(SignalKind::interrupt()) {
                Ok(s) => s,
                Err(e) => {
                    error!("failed to install SIGINT handler: {e}");
                    return;
                }
            };
            tokio::select! {
                _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
                _ = sigint.recv() => info!("received SIGINT, shutting down"),
            }
            handle.request_shutdown();
        });
    }
}

/// Runs the accept loop of every bound endpoint.
struct SocketController {
    acceptors: Vec<(String, Acceptor)>,
    keys: Arc<KeyManager>,
    auth: bool,
}

impl Controller for SocketController {
    fn attach(&mut self, handle: ManagerHandle) {
        let ctx = Arc::new(ListenCtx {
            manager: handle,
            keys: Arc::clone(&self.keys),
            auth: self.auth,
            started_at: Instant::now(),
        });
        for (name, acceptor) in self.acceptors.drain(..) {
            let listener = Listener::new(name, acceptor, Arc::clone(&ctx));
            tokio::spawn(listener.run());
        }
    }
}
