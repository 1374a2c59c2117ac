// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON-line protocol spoken over the daemon socket
//!
//! One request per line. Most requests get exactly one response line; a
//! `subscribe` request switches the connection into streaming mode, where
//! the server pushes `event` lines and the client may send monitor verbs.

use murmur_core::events::EventEnvelope;
use murmur_core::intake::EnqueueOpts;
use murmur_core::job::{Job, JobType};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

pub const PROTOCOL_VERSION: &str = "1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("timed out")]
    Timeout,
    #[error("connection closed")]
    ConnectionClosed,
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Client -> daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Request {
    Ping,
    Hello {
        version: String,
    },
    Status,
    Shutdown,
    Enqueue {
        tenant_id: String,
        job_type: JobType,
        payload: serde_json::Value,
        #[serde(default)]
        opts: EnqueueOpts,
    },
    EnqueueBulk {
        tenant_id: String,
        job_type: JobType,
        payloads: Vec<serde_json::Value>,
        #[serde(default)]
        opts: EnqueueOpts,
    },
    EnqueueByCategory {
        tenant_id: String,
        job_type: JobType,
        category_id: String,
        payload: serde_json::Value,
        #[serde(default)]
        opts: EnqueueOpts,
    },
    GetJob {
        tenant_id: String,
        job_type: JobType,
        job_id: String,
    },
    ListByParent {
        tenant_id: String,
        job_type: JobType,
        parent_id: String,
    },
    /// Switch this connection into a live event stream
    Subscribe {
        tenant_id: String,
    },
    /// Queue-admin surface; requires the admin key in production
    Queues {
        #[serde(default)]
        admin_key: Option<String>,
    },
}

/// Verbs a subscribed connection may send
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum SubscribeOp {
    MonitorJob { job_id: String },
    MonitorGroup { parent_id: String },
    Unmonitor { job_id: String },
}

/// Daemon -> client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Response {
    Pong,
    Hello {
        version: String,
    },
    Status {
        uptime_secs: u64,
        queues: usize,
        pools: usize,
        subscribers: usize,
    },
    ShuttingDown,
    Enqueued {
        job_id: String,
    },
    BulkEnqueued {
        parent_id: String,
        job_ids: Vec<String>,
    },
    CategoryEnqueued {
        parent_id: String,
        job_ids: Vec<String>,
        account_count: usize,
    },
    Job {
        job: Box<Job>,
    },
    Jobs {
        jobs: Vec<Job>,
    },
    Subscribed {
        subscriber_id: String,
    },
    /// Replay sent after a monitor verb, when a projection is cached
    Monitored {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cached: Option<serde_json::Value>,
    },
    Event {
        envelope: EventEnvelope,
    },
    Queues {
        queues: Vec<String>,
    },
    Error {
        message: String,
    },
}

/// Read one JSON line and parse it
pub async fn read_line<R, T>(
    reader: &mut BufReader<R>,
    timeout: Duration,
) -> Result<T, ProtocolError>
where
    R: AsyncRead + Unpin,
    T: serde::de::DeserializeOwned,
{
    let mut line = String::new();
    let read = tokio::time::timeout(timeout, reader.read_line(&mut line))
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    if read == 0 {
        return Err(ProtocolError::ConnectionClosed);
    }
    serde_json::from_str(line.trim()).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

/// Serialize one message as a JSON line
pub async fn write_line<W, T>(
    writer: &mut W,
    message: &T,
    timeout: Duration,
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut json =
        serde_json::to_string(message).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    json.push('\n');
    tokio::time::timeout(timeout, writer.write_all(json.as_bytes()))
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_round_trip() {
        let request = Request::Enqueue {
            tenant_id: "t1".into(),
            job_type: JobType::MassPost,
            payload: serde_json::json!({"postOptions": {"posts": [{"text": "hi"}]}}),
            opts: EnqueueOpts::default(),
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains(r#""type":"enqueue"#));
        assert!(json.contains(r#""jobType":"massPost"#));

        let parsed: Request = serde_json::from_str(&json).unwrap();
        assert!(matches!(parsed, Request::Enqueue { .. }));
    }

    #[test]
    fn opts_default_when_absent() {
        let parsed: Request = serde_json::from_str(
            r#"{"type":"enqueue","tenantId":"t1","jobType":"chat","payload":{}}"#,
        )
        .unwrap();
        match parsed {
            Request::Enqueue { opts, .. } => {
                assert!(opts.priority.is_none());
                assert!(opts.delay_s.is_none());
            }
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[test]
    fn subscribe_ops_parse() {
        let op: SubscribeOp =
            serde_json::from_str(r#"{"type":"monitor_job","jobId":"j1"}"#).unwrap();
        assert!(matches!(op, SubscribeOp::MonitorJob { job_id } if job_id == "j1"));
    }

    #[tokio::test]
    async fn lines_round_trip_over_a_duplex_pipe() {
        let (client, server) = tokio::io::duplex(4096);
        let (server_read, _server_write) = tokio::io::split(server);
        let (_client_read, mut client_write) = tokio::io::split(client);

        write_line(&mut client_write, &Request::Ping, DEFAULT_TIMEOUT)
            .await
            .unwrap();

        let mut reader = BufReader::new(server_read);
        let request: Request = read_line(&mut reader, DEFAULT_TIMEOUT).await.unwrap();
        assert!(matches!(request, Request::Ping));
    }

    #[tokio::test]
    async fn closed_pipe_reports_connection_closed() {
        let (client, server) = tokio::io::duplex(64);
        drop(client);
        let (server_read, _server_write) = tokio::io::split(server);
        let mut reader = BufReader::new(server_read);

        let result: Result<Request, _> = read_line(&mut reader, DEFAULT_TIMEOUT).await;
        assert!(matches!(result, Err(ProtocolError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn garbage_is_malformed() {
        let (client, server) = tokio::io::duplex(64);
        let (server_read, _sw) = tokio::io::split(server);
        let (_cr, mut client_write) = tokio::io::split(client);

        client_write.write_all(b"not json\n").await.unwrap();
        let mut reader = BufReader::new(server_read);
        let result: Result<Request, _> = read_line(&mut reader, DEFAULT_TIMEOUT).await;
        assert!(matches!(result, Err(ProtocolError::Malformed(_))));
    }
}
