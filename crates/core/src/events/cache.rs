// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Last-known job projections for late subscribers
//!
//! The fan-out hub updates this cache synchronously on every lifecycle
//! event. Entries for terminal jobs are kept for a TTL so a subscriber
//! that connects after completion can still see the outcome and replay
//! recent log lines.

use crate::clock::Clock;
use crate::event::Event;
use crate::job::{JobState, LogEntry};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// How many log lines are replayed to a late subscriber
pub const REPLAY_LOG_CAP: usize = 50;

const DEFAULT_TERMINAL_TTL: Duration = Duration::from_secs(300);

/// Cached projection of a live or recently-terminal job
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedJob {
    pub job_id: String,
    pub tenant_id: String,
    pub parent_id: Option<String>,
    pub state: JobState,
    pub progress: u8,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub recent_logs: Vec<LogEntry>,
}

struct CacheEntry {
    job: CachedJob,
    logs: VecDeque<LogEntry>,
    updated_at: Instant,
}

/// Per-job state projections, bounded by a post-terminal TTL
pub struct JobStateCache<C: Clock> {
    entries: Mutex<HashMap<String, CacheEntry>>,
    terminal_ttl: Duration,
    clock: C,
}

impl<C: Clock> JobStateCache<C> {
    pub fn new(clock: C) -> Self {
        Self::with_ttl(clock, DEFAULT_TERMINAL_TTL)
    }

    pub fn with_ttl(clock: C, terminal_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            terminal_ttl,
            clock,
        }
    }

    /// Project an event into the cache
    pub fn apply(&self, event: &Event) {
        let Some(job_id) = event.job_id() else {
            return;
        };

        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries
            .entry(job_id.to_string())
            .or_insert_with(|| CacheEntry {
                job: CachedJob {
                    job_id: job_id.to_string(),
                    tenant_id: event.tenant_id().to_string(),
                    parent_id: event.parent_id().map(str::to_string),
                    state: JobState::Waiting,
                    progress: 0,
                    result: None,
                    error: None,
                    recent_logs: Vec::new(),
                },
                logs: VecDeque::new(),
                updated_at: now,
            });
        entry.updated_at = now;

        match event {
            Event::JobAdded { .. } => entry.job.state = JobState::Waiting,
            Event::JobStarted { .. } => {
                entry.job.state = JobState::Active;
                entry.job.progress = 0;
            }
            Event::JobProgress { progress, .. } => {
                if entry.job.state == JobState::Active && *progress > entry.job.progress {
                    entry.job.progress = *progress;
                }
            }
            Event::JobCompleted { result, .. } => {
                entry.job.state = JobState::Completed;
                entry.job.progress = 100;
                entry.job.result = Some(result.clone());
            }
            Event::JobFailed { error, .. } => {
                entry.job.state = JobState::Failed;
                entry.job.error = Some(error.clone());
            }
            Event::JobStalled { .. } => entry.job.state = JobState::Stalled,
            Event::JobLog { entry: line, .. } => {
                if entry.logs.len() == REPLAY_LOG_CAP {
                    entry.logs.pop_front();
                }
                entry.logs.push_back(line.clone());
            }
            Event::WorkerError { .. } => {}
        }
    }

    /// Last-known projection with replayable log lines
    pub fn get(&self, job_id: &str) -> Option<CachedJob> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(job_id).map(|entry| {
            let mut job = entry.job.clone();
            job.recent_logs = entry.logs.iter().cloned().collect();
            job
        })
    }

    /// Drop terminal entries older than the TTL
    pub fn sweep(&self) {
        let now = self.clock.now();
        let ttl = self.terminal_ttl;
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, e| !e.job.state.is_terminal() || now - e.updated_at < ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::job::{JobType, LogLevel};

    fn cache() -> (JobStateCache<FakeClock>, FakeClock) {
        let clock = FakeClock::new();
        (JobStateCache::new(clock.clone()), clock)
    }

    fn started(job: &str) -> Event {
        Event::JobStarted {
            tenant_id: "t1".into(),
            job_id: job.into(),
            parent_id: None,
            job_type: JobType::Chat,
            attempt: 1,
        }
    }

    #[test]
    fn lifecycle_projects_state_and_progress() {
        let (cache, _clock) = cache();

        cache.apply(&started("j1"));
        cache.apply(&Event::JobProgress {
            tenant_id: "t1".into(),
            job_id: "j1".into(),
            parent_id: None,
            progress: 60,
        });

        let cached = cache.get("j1").unwrap();
        assert_eq!(cached.state, JobState::Active);
        assert_eq!(cached.progress, 60);

        cache.apply(&Event::JobCompleted {
            tenant_id: "t1".into(),
            job_id: "j1".into(),
            parent_id: None,
            result: serde_json::json!({"ok": true}),
        });

        let cached = cache.get("j1").unwrap();
        assert_eq!(cached.state, JobState::Completed);
        assert_eq!(cached.progress, 100);
        assert!(cached.result.is_some());
    }

    #[test]
    fn progress_never_regresses() {
        let (cache, _clock) = cache();
        cache.apply(&started("j1"));
        for pct in [30u8, 10, 80, 40] {
            cache.apply(&Event::JobProgress {
                tenant_id: "t1".into(),
                job_id: "j1".into(),
                parent_id: None,
                progress: pct,
            });
        }
        assert_eq!(cache.get("j1").unwrap().progress, 80);
    }

    #[test]
    fn replay_logs_bounded_to_cap() {
        let (cache, _clock) = cache();
        cache.apply(&started("j1"));
        for i in 0..(REPLAY_LOG_CAP + 10) {
            cache.apply(&Event::JobLog {
                tenant_id: "t1".into(),
                job_id: "j1".into(),
                parent_id: None,
                entry: LogEntry::new(LogLevel::Info, format!("line {}", i)),
            });
        }

        let logs = cache.get("j1").unwrap().recent_logs;
        assert_eq!(logs.len(), REPLAY_LOG_CAP);
        assert_eq!(logs[0].message, "line 10");
    }

    #[test]
    fn sweep_evicts_terminal_entries_after_ttl() {
        let clock = FakeClock::new();
        let cache = JobStateCache::with_ttl(clock.clone(), Duration::from_secs(60));

        cache.apply(&started("done"));
        cache.apply(&Event::JobCompleted {
            tenant_id: "t1".into(),
            job_id: "done".into(),
            parent_id: None,
            result: serde_json::json!({}),
        });
        cache.apply(&started("live"));

        clock.advance_secs(120);
        cache.sweep();

        assert!(cache.get("done").is_none());
        assert!(cache.get("live").is_some());
    }
}
