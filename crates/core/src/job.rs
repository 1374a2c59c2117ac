// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job model and state machine
//!
//! State transitions only along `waiting -> active -> {completed, failed}`
//! or `active -> stalled -> active`. Progress is monotonic non-decreasing
//! within a single active span. Logs are append-only until terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The fixed set of job types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobType {
    #[serde(rename = "massPost")]
    MassPost,
    #[serde(rename = "engagement")]
    Engagement,
    #[serde(rename = "chat")]
    Chat,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::MassPost => "massPost",
            JobType::Engagement => "engagement",
            JobType::Chat => "chat",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "massPost" => Some(JobType::MassPost),
            "engagement" => Some(JobType::Engagement),
            "chat" => Some(JobType::Chat),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
    Stalled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Legal transitions of the job state machine
    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Waiting, JobState::Active)
                | (JobState::Active, JobState::Completed)
                | (JobState::Active, JobState::Failed)
                | (JobState::Active, JobState::Stalled)
                | (JobState::Stalled, JobState::Active)
                | (JobState::Stalled, JobState::Failed)
                | (JobState::Active, JobState::Waiting)
        )
    }
}

/// Severity of a job log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

/// Where a job log line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    /// Written through the structured per-job logger
    Structured,
    /// Ambient output captured at the task boundary
    Captured,
}

/// One line of per-job telemetry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub source: LogSource,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            source: LogSource::Structured,
        }
    }
}

/// A job as stored by the queue backend and projected to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub tenant_id: String,
    pub job_type: JobType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub max_attempts: u32,
    pub state: JobState,
    /// Integer percentage 0..=100
    pub progress: u8,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    pub fn new(
        id: impl Into<String>,
        tenant_id: impl Into<String>,
        job_type: JobType,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            job_type,
            parent_id: None,
            created_at: Utc::now(),
            processed_at: None,
            finished_at: None,
            attempts: 0,
            max_attempts: 5,
            state: JobState::Waiting,
            progress: 0,
            payload,
            logs: Vec::new(),
            result: None,
            error: None,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Mark the job active for a new attempt
    pub fn begin_attempt(&mut self) {
        debug_assert!(self.state.can_transition_to(JobState::Active));
        self.state = JobState::Active;
        self.attempts += 1;
        self.processed_at = Some(Utc::now());
        // A fresh active span restarts progress
        self.progress = 0;
    }

    /// Raise progress; draws below the current value are ignored
    pub fn advance_progress(&mut self, pct: u8) {
        let pct = pct.min(100);
        if self.state == JobState::Active && pct > self.progress {
            self.progress = pct;
        }
    }

    pub fn finish_completed(&mut self, result: serde_json::Value) {
        self.state = JobState::Completed;
        self.progress = 100;
        self.result = Some(result);
        self.finished_at = Some(Utc::now());
    }

    pub fn finish_failed(&mut self, error: impl Into<String>) {
        self.state = JobState::Failed;
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());
    }
}
