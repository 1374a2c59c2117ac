// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured events carried by the in-process bus
//!
//! Every event is tagged with the tenant it belongs to; lifecycle events
//! additionally carry the job id and, for bulk children, the parent id.

use crate::job::{JobType, LogEntry};
use serde::{Deserialize, Serialize};

/// Job lifecycle and telemetry events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Event {
    JobAdded {
        tenant_id: String,
        job_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_id: Option<String>,
        job_type: JobType,
    },
    JobStarted {
        tenant_id: String,
        job_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_id: Option<String>,
        job_type: JobType,
        attempt: u32,
    },
    JobProgress {
        tenant_id: String,
        job_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_id: Option<String>,
        progress: u8,
    },
    JobCompleted {
        tenant_id: String,
        job_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_id: Option<String>,
        result: serde_json::Value,
    },
    JobFailed {
        tenant_id: String,
        job_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_id: Option<String>,
        error: String,
    },
    JobStalled {
        tenant_id: String,
        job_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_id: Option<String>,
    },
    JobLog {
        tenant_id: String,
        job_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_id: Option<String>,
        entry: LogEntry,
    },
    WorkerError {
        tenant_id: String,
        queue: String,
        message: String,
    },
}

impl Event {
    /// Colon-separated event name used for pattern subscriptions
    pub fn name(&self) -> &'static str {
        match self {
            Event::JobAdded { .. } => "job:added",
            Event::JobStarted { .. } => "job:started",
            Event::JobProgress { .. } => "job:progress",
            Event::JobCompleted { .. } => "job:completed",
            Event::JobFailed { .. } => "job:failed",
            Event::JobStalled { .. } => "job:stalled",
            Event::JobLog { .. } => "job:log",
            Event::WorkerError { .. } => "worker:error",
        }
    }

    pub fn tenant_id(&self) -> &str {
        match self {
            Event::JobAdded { tenant_id, .. }
            | Event::JobStarted { tenant_id, .. }
            | Event::JobProgress { tenant_id, .. }
            | Event::JobCompleted { tenant_id, .. }
            | Event::JobFailed { tenant_id, .. }
            | Event::JobStalled { tenant_id, .. }
            | Event::JobLog { tenant_id, .. }
            | Event::WorkerError { tenant_id, .. } => tenant_id,
        }
    }

    pub fn job_id(&self) -> Option<&str> {
        match self {
            Event::JobAdded { job_id, .. }
            | Event::JobStarted { job_id, .. }
            | Event::JobProgress { job_id, .. }
            | Event::JobCompleted { job_id, .. }
            | Event::JobFailed { job_id, .. }
            | Event::JobStalled { job_id, .. }
            | Event::JobLog { job_id, .. } => Some(job_id),
            Event::WorkerError { .. } => None,
        }
    }

    pub fn parent_id(&self) -> Option<&str> {
        match self {
            Event::JobAdded { parent_id, .. }
            | Event::JobStarted { parent_id, .. }
            | Event::JobProgress { parent_id, .. }
            | Event::JobCompleted { parent_id, .. }
            | Event::JobFailed { parent_id, .. }
            | Event::JobStalled { parent_id, .. }
            | Event::JobLog { parent_id, .. } => parent_id.as_deref(),
            Event::WorkerError { .. } => None,
        }
    }

    /// Lifecycle events update the job state cache; log lines do not
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Event::JobAdded { .. }
                | Event::JobStarted { .. }
                | Event::JobProgress { .. }
                | Event::JobCompleted { .. }
                | Event::JobFailed { .. }
                | Event::JobStalled { .. }
        )
    }
}
