// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! gafferd: supervise declared jobs and serve the control plane.
//!
//! Exit codes: 0 on clean shutdown, 1 on pid-file conflict or fatal
//! configuration error. SIGINT and SIGTERM trigger clean shutdown.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use clap::Parser;
use gaffer_daemon::config::Settings;
use gaffer_daemon::lifecycle::{self, DaemonError};
use gaffer_daemon::pidfile::PidFile;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Parser)]
#[command(
    name = "gafferd",
    version,
    about = "Run and supervise the jobs declared in a configuration file"
)]
struct Args {
    /// Configuration file
    config: PathBuf,

    /// Start gafferd in the background
    #[arg(long)]
    daemon: bool,

    /// Write the daemon pid to this file
    #[arg(long, value_name = "PATH")]
    pidfile: Option<PathBuf>,
}

fn main() {
    let args = Args::parse();

    let settings = match Settings::load(&args.config) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("gafferd: {e}");
            std::process::exit(1);
        }
    };

    // Detach before the runtime exists; forking after worker threads
    // have started is unsound.
    if args.daemon {
        if let Err(e) = nix::unistd::daemon(false, false) {
            eprintln!("gafferd: failed to daemonize: {e}");
            std::process::exit(1);
        }
    }

    let _log_guard = match setup_logging(&settings, args.daemon) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("gafferd: failed to set up logging: {e}");
            std::process::exit(1);
        }
    };

    // After daemonize so the file records the detached pid.
    let _pidfile = match args.pidfile.as_deref().map(PidFile::create).transpose() {
        Ok(pidfile) => pidfile,
        Err(e) => {
            eprintln!("gafferd: {e}");
            tracing::error!("{e}");
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("gafferd: failed to start runtime: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(settings)) {
        eprintln!("gafferd: {e}");
        tracing::error!("fatal: {e}");
        std::process::exit(1);
    }
}

async fn run(settings: Settings) -> Result<(), DaemonError> {
    let server = lifecycle::startup(&settings).await?;
    info!("gafferd ready");

    server.manager.run().await;

    server.keys.close()?;
    info!("gafferd stopped");
    Ok(())
}

/// Log to stderr in the foreground; to a file when daemonized or when
/// the config names one.
fn setup_logging(
    settings: &Settings,
    daemonized: bool,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>, std::io::Error> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let log_file = settings.log_file.clone().or_else(|| {
        daemonized.then(|| settings.config_dir.join("gafferd.log"))
    });

    match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            std::fs::create_dir_all(dir)?;
            let name = path
                .file_name()
                .ok_or_else(|| std::io::Error::other("log_file has no file name"))?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
            Ok(None)
        }
    }
}
