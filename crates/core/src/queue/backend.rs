// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue backend contract

use crate::error::JobError;
use crate::job::{Job, JobState, LogEntry};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;

/// Exponential retry backoff base
pub const BACKOFF_BASE: Duration = Duration::from_secs(5);
/// Backoff ceiling
pub const BACKOFF_CAP: Duration = Duration::from_secs(30);
/// Lease duration while a job is active
pub const DEFAULT_LOCK_DURATION: Duration = Duration::from_secs(30);
/// Stall detections before a job fails permanently
pub const MAX_STALLED_COUNT: u32 = 2;

/// Per-enqueue options
#[derive(Debug, Clone)]
pub struct JobOptions {
    /// Higher claims first; ties break FIFO
    pub priority: i32,
    /// Hold the job back before it becomes claimable
    pub delay: Option<Duration>,
    /// Maximum delivery attempts
    pub attempts: u32,
    pub backoff_base: Duration,
    pub lock_duration: Duration,
    pub max_stalled_count: u32,
    pub remove_on_complete_age: Duration,
    pub remove_on_complete_count: usize,
    pub remove_on_fail_age: Duration,
    pub remove_on_fail_count: usize,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            priority: 0,
            delay: None,
            attempts: 5,
            backoff_base: BACKOFF_BASE,
            lock_duration: DEFAULT_LOCK_DURATION,
            max_stalled_count: MAX_STALLED_COUNT,
            remove_on_complete_age: Duration::from_secs(24 * 60 * 60),
            remove_on_complete_count: 1000,
            remove_on_fail_age: Duration::from_secs(7 * 24 * 60 * 60),
            remove_on_fail_count: 3000,
        }
    }
}

/// Exclusive claim on one job
#[derive(Debug)]
pub struct Lease {
    pub job: Job,
    pub token: String,
    pub lock_duration: Duration,
}

/// Events on a queue's observation stream
#[derive(Debug, Clone)]
pub enum QueueSignal {
    Completed {
        job_id: String,
        parent_id: Option<String>,
        result: serde_json::Value,
    },
    Failed {
        job_id: String,
        parent_id: Option<String>,
        error: String,
    },
    Progress {
        job_id: String,
        parent_id: Option<String>,
        progress: u8,
    },
    Stalled {
        job_id: String,
        parent_id: Option<String>,
    },
}

/// How a failed attempt should be retried, if at all
#[derive(Debug, Clone)]
pub struct FailureReport {
    pub message: String,
    /// Overrides the computed backoff when set
    pub retry_after: Option<Duration>,
    /// Skip remaining attempts; the failure is final
    pub terminal: bool,
}

impl FailureReport {
    pub fn retriable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retry_after: None,
            terminal: false,
        }
    }

    pub fn terminal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retry_after: None,
            terminal: true,
        }
    }

    pub fn from_error(error: &JobError) -> Self {
        Self {
            message: error.to_string(),
            retry_after: None,
            terminal: !error.is_retriable(),
        }
    }
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("unknown job: {0}")]
    UnknownJob(String),
    #[error("lease lost for job {0}")]
    LeaseLost(String),
    #[error("queue closed")]
    Closed,
}

/// The durable-queue capability
#[async_trait]
pub trait QueueBackend: Send + Sync + 'static {
    async fn enqueue(&self, queue: &str, job: Job, opts: &JobOptions) -> Result<(), QueueError>;

    /// Atomic at per-item granularity
    async fn enqueue_batch(
        &self,
        queue: &str,
        jobs: Vec<Job>,
        opts: &JobOptions,
    ) -> Result<(), QueueError>;

    /// Claim one ready job, blocking until one is available
    async fn claim(&self, queue: &str, worker: &str) -> Result<Lease, QueueError>;

    /// Extend the lease; required while the job is active
    async fn renew_lease(&self, queue: &str, job_id: &str, token: &str)
        -> Result<(), QueueError>;

    async fn complete(
        &self,
        queue: &str,
        job_id: &str,
        token: &str,
        result: serde_json::Value,
        logs: Vec<LogEntry>,
    ) -> Result<(), QueueError>;

    async fn fail(
        &self,
        queue: &str,
        job_id: &str,
        token: &str,
        report: FailureReport,
        logs: Vec<LogEntry>,
    ) -> Result<(), QueueError>;

    async fn report_progress(
        &self,
        queue: &str,
        job_id: &str,
        token: &str,
        progress: u8,
    ) -> Result<(), QueueError>;

    async fn get_job(&self, queue: &str, id: &str) -> Result<Option<Job>, QueueError>;

    async fn list_by_state(
        &self,
        queue: &str,
        states: &[JobState],
    ) -> Result<Vec<Job>, QueueError>;

    /// May scan the whole queue
    async fn list_by_parent(&self, queue: &str, parent_id: &str)
        -> Result<Vec<Job>, QueueError>;

    /// Observation stream of completed/failed/progress/stalled events
    fn observe(&self, queue: &str) -> broadcast::Receiver<QueueSignal>;
}

/// Exponential backoff: `base * 2^(attempt-1)`, capped
pub fn backoff_delay(attempt: u32, base: Duration) -> Duration {
    let shift = attempt.saturating_sub(1).min(16);
    let delay = base.saturating_mul(1u32 << shift);
    delay.min(BACKOFF_CAP)
}
