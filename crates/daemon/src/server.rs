// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket server and connection handling

use crate::lifecycle::Daemon;
use crate::protocol::{
    self, ProtocolError, Request, Response, SubscribeOp, DEFAULT_TIMEOUT, PROTOCOL_VERSION,
};
use murmur_core::events::SubscriberId;
use murmur_core::id::{IdGen, UuidIdGen};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::BufReader;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Read timeout on an idle subscribed connection before re-arming
const SUBSCRIBE_IDLE: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("request read timeout")]
    Timeout,
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Handle a single client connection
pub async fn handle_connection(daemon: Arc<Daemon>, stream: UnixStream) -> Result<(), ServerError> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let request: Request = match protocol::read_line(&mut reader, DEFAULT_TIMEOUT).await {
        Ok(request) => request,
        Err(ProtocolError::ConnectionClosed) => {
            debug!("client disconnected before sending a request");
            return Ok(());
        }
        Err(ProtocolError::Timeout) => {
            error!("request read timeout");
            return Err(ServerError::Timeout);
        }
        Err(ProtocolError::Malformed(message)) => {
            let _ = protocol::write_line(
                &mut write_half,
                &Response::Error { message },
                DEFAULT_TIMEOUT,
            )
            .await;
            return Ok(());
        }
        Err(e) => return Err(ServerError::Protocol(e)),
    };

    debug!(?request, "received request");

    if let Request::Subscribe { tenant_id } = request {
        return handle_subscription(daemon, tenant_id, reader, write_half).await;
    }

    let response = handle_request(&daemon, request).await;
    protocol::write_line(&mut write_half, &response, DEFAULT_TIMEOUT).await?;
    Ok(())
}

/// Handle a single request and return a response
async fn handle_request(daemon: &Daemon, request: Request) -> Response {
    match request {
        Request::Ping => Response::Pong,

        Request::Hello { version: _ } => Response::Hello {
            version: PROTOCOL_VERSION.to_string(),
        },

        Request::Status => Response::Status {
            uptime_secs: daemon.uptime_secs(),
            queues: daemon.registry.queue_names().len(),
            pools: daemon.fleet.pool_count().await,
            subscribers: daemon.hub.subscriber_count(),
        },

        Request::Shutdown => {
            daemon.shutdown.cancel();
            Response::ShuttingDown
        }

        Request::Enqueue {
            tenant_id,
            job_type,
            payload,
            opts,
        } => match daemon
            .intake
            .enqueue(&tenant_id, job_type, payload, &opts)
            .await
        {
            Ok(job_id) => Response::Enqueued { job_id },
            Err(e) => Response::Error {
                message: e.to_string(),
            },
        },

        Request::EnqueueBulk {
            tenant_id,
            job_type,
            payloads,
            opts,
        } => match daemon
            .intake
            .enqueue_bulk(&tenant_id, job_type, payloads, &opts)
            .await
        {
            Ok(receipt) => Response::BulkEnqueued {
                parent_id: receipt.parent_id,
                job_ids: receipt.job_ids,
            },
            Err(e) => Response::Error {
                message: e.to_string(),
            },
        },

        Request::EnqueueByCategory {
            tenant_id,
            job_type,
            category_id,
            payload,
            opts,
        } => match daemon
            .intake
            .enqueue_by_category(&tenant_id, job_type, &category_id, payload, &opts)
            .await
        {
            Ok(receipt) => Response::CategoryEnqueued {
                parent_id: receipt.parent_id,
                job_ids: receipt.job_ids,
                account_count: receipt.account_count,
            },
            Err(e) => Response::Error {
                message: e.to_string(),
            },
        },

        Request::GetJob {
            tenant_id,
            job_type,
            job_id,
        } => match daemon.intake.get_job(&tenant_id, job_type, &job_id).await {
            Ok(job) => Response::Job { job: Box::new(job) },
            Err(e) => Response::Error {
                message: e.to_string(),
            },
        },

        Request::ListByParent {
            tenant_id,
            job_type,
            parent_id,
        } => match daemon
            .intake
            .list_jobs_by_parent(&tenant_id, job_type, &parent_id)
            .await
        {
            Ok(jobs) => Response::Jobs { jobs },
            Err(e) => Response::Error {
                message: e.to_string(),
            },
        },

        Request::Queues { admin_key } => {
            if daemon.config.admin_allowed(admin_key.as_deref()) {
                Response::Queues {
                    queues: daemon.registry.queue_names(),
                }
            } else {
                Response::Error {
                    message: "admin key required".to_string(),
                }
            }
        }

        // Handled by the caller before this point
        Request::Subscribe { .. } => Response::Error {
            message: "subscribe must open its own connection".to_string(),
        },
    }
}

/// Streaming mode: push events, accept monitor verbs
async fn handle_subscription(
    daemon: Arc<Daemon>,
    tenant_id: String,
    reader: BufReader<OwnedReadHalf>,
    mut writer: OwnedWriteHalf,
) -> Result<(), ServerError> {
    let subscriber_id = UuidIdGen.next();
    let mut events = daemon.hub.subscribe(&subscriber_id, &tenant_id);
    let id = SubscriberId(subscriber_id.clone());

    protocol::write_line(
        &mut writer,
        &Response::Subscribed { subscriber_id },
        DEFAULT_TIMEOUT,
    )
    .await?;
    debug!(tenant_id, subscriber = %id, "subscriber connected");

    // A live connection bootstraps the tenant's pools at the live
    // concurrency; pools already there are left alone.
    {
        let daemon = Arc::clone(&daemon);
        let suffix = format!("-{}", tenant_id);
        tokio::spawn(async move {
            for queue in daemon.registry.queue_names() {
                if queue.ends_with(&suffix) {
                    daemon
                        .fleet
                        .replace_pool(&queue, murmur_core::pool::LIVE_CONCURRENCY)
                        .await;
                }
            }
        });
    }

    // Monitor verbs arrive on their own task so event pushes never block
    // on a slow reader.
    let (op_tx, mut op_rx) = mpsc::unbounded_channel::<SubscribeOp>();
    let op_reader = tokio::spawn(async move {
        let mut reader = reader;
        loop {
            match protocol::read_line::<_, SubscribeOp>(&mut reader, SUBSCRIBE_IDLE).await {
                Ok(op) => {
                    if op_tx.send(op).is_err() {
                        break;
                    }
                }
                Err(ProtocolError::Timeout) => continue,
                Err(ProtocolError::Malformed(message)) => {
                    debug!(message, "ignoring malformed monitor verb");
                }
                Err(_) => break,
            }
        }
    });

    let result = loop {
        tokio::select! {
            maybe_envelope = events.recv() => match maybe_envelope {
                Some(envelope) => {
                    if protocol::write_line(&mut writer, &Response::Event { envelope }, DEFAULT_TIMEOUT)
                        .await
                        .is_err()
                    {
                        break Ok(());
                    }
                }
                None => break Ok(()),
            },

            maybe_op = op_rx.recv() => match maybe_op {
                Some(op) => {
                    let reply = apply_op(&daemon, &id, op);
                    if protocol::write_line(&mut writer, &reply, DEFAULT_TIMEOUT).await.is_err() {
                        break Ok(());
                    }
                }
                None => break Ok(()),
            },

            _ = daemon.shutdown.cancelled() => {
                let _ = protocol::write_line(&mut writer, &Response::ShuttingDown, DEFAULT_TIMEOUT).await;
                break Ok(());
            }
        }
    };

    op_reader.abort();
    daemon.hub.disconnect(&id);
    debug!(subscriber = %id, "subscriber disconnected");
    result
}

fn apply_op(daemon: &Daemon, id: &SubscriberId, op: SubscribeOp) -> Response {
    match op {
        SubscribeOp::MonitorJob { job_id } => {
            let cached = daemon
                .hub
                .monitor_job(id, &job_id)
                .and_then(|c| serde_json::to_value(c).ok());
            Response::Monitored { cached }
        }
        SubscribeOp::MonitorGroup { parent_id } => {
            daemon.hub.monitor_group(id, &parent_id);
            Response::Monitored { cached: None }
        }
        SubscribeOp::Unmonitor { job_id } => {
            daemon.hub.unmonitor_job(id, &job_id);
            Response::Monitored { cached: None }
        }
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
