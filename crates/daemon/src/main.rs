// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! murmurd: the murmur orchestration daemon
//!
//! Owns the queueing fleet and worker pools, and serves the command
//! surface plus live event subscriptions over a unix socket.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod lifecycle;
mod protocol;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use murmur_core::config::Config;
use tokio::net::UnixListener;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Socket path from argv, next to the working directory by default
    let args: Vec<String> = std::env::args().collect();
    let socket_path = if args.len() > 1 {
        PathBuf::from(&args[1])
    } else {
        PathBuf::from("murmurd.sock")
    };

    let config = Config::from_env()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(
        mode = ?config.mode,
        concurrency = config.concurrency_default,
        backend = %config.redis.connection_string(),
        "starting murmurd"
    );
    warn!("no upstream social binding configured; running the in-process simulator");

    // Stale socket from an unclean shutdown
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)?;
    }
    let listener = UnixListener::bind(&socket_path)?;

    let daemon = Arc::new(lifecycle::Daemon::new(config)?);

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!("daemon ready, listening on {}", socket_path.display());

    // Signal ready for a parent process waiting on startup
    println!("READY");

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let daemon = Arc::clone(&daemon);
                    tokio::spawn(async move {
                        if let Err(e) = server::handle_connection(daemon, stream).await {
                            error!(error = %e, "connection handler failed");
                        }
                    });
                }
                Err(e) => error!(error = %e, "accept failed"),
            },

            _ = sigterm.recv() => {
                info!("SIGTERM received");
                break;
            }
            _ = sigint.recv() => {
                info!("SIGINT received");
                break;
            }
            _ = daemon.shutdown.cancelled() => {
                info!("shutdown requested over the socket");
                break;
            }
        }
    }

    daemon.stop().await;
    let _ = std::fs::remove_file(&socket_path);
    info!("murmurd stopped");
    Ok(())
}
