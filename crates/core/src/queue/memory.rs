// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process queue backend implementing the full contract
//!
//! Ready jobs are ordered by priority then FIFO. Claimed jobs hold a lease
//! with an expiry; a lease not renewed within its lock duration counts as a
//! stall detection, and after `max_stalled_count` detections the job fails
//! permanently. Failed attempts re-enter the queue after exponential
//! backoff until attempts are exhausted.

use super::backend::{
    backoff_delay, FailureReport, JobOptions, Lease, QueueBackend, QueueError, QueueSignal,
};
use crate::clock::Clock;
use crate::job::{Job, JobState, LogEntry};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Notify};

const SIGNAL_CHANNEL_CAP: usize = 256;
const CLAIM_POLL_INTERVAL: Duration = Duration::from_millis(200);

struct LeaseState {
    token: String,
    expires_at: Instant,
}

struct StoredJob {
    job: Job,
    opts: JobOptions,
    seq: u64,
    priority: i32,
    /// Set while the job is delayed or backing off
    ready_at: Option<Instant>,
    lease: Option<LeaseState>,
    stalled_count: u32,
    terminal_at: Option<Instant>,
}

struct Shard {
    jobs: HashMap<String, StoredJob>,
    /// Claimable job ids, sorted by priority desc then enqueue order
    ready: Vec<String>,
    notify: Arc<Notify>,
    signals: broadcast::Sender<QueueSignal>,
    next_seq: u64,
}

impl Shard {
    fn new() -> Self {
        let (signals, _) = broadcast::channel(SIGNAL_CHANNEL_CAP);
        Self {
            jobs: HashMap::new(),
            ready: Vec::new(),
            notify: Arc::new(Notify::new()),
            signals,
            next_seq: 0,
        }
    }

    fn sort_ready(&mut self) {
        let Shard { ready, jobs, .. } = self;
        ready.sort_by(|a, b| {
            let ka = jobs.get(a).map(|j| (j.priority, j.seq)).unwrap_or((0, 0));
            let kb = jobs.get(b).map(|j| (j.priority, j.seq)).unwrap_or((0, 0));
            kb.0.cmp(&ka.0).then(ka.1.cmp(&kb.1))
        });
    }

    fn emit(&self, signal: QueueSignal) {
        let _ = self.signals.send(signal);
    }
}

struct Inner<C: Clock> {
    shards: Mutex<HashMap<String, Shard>>,
    clock: C,
}

/// In-memory queue backend
pub struct MemoryQueue<C: Clock> {
    inner: Arc<Inner<C>>,
}

impl<C: Clock> Clone for MemoryQueue<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Clock> MemoryQueue<C> {
    pub fn new(clock: C) -> Self {
        Self {
            inner: Arc::new(Inner {
                shards: Mutex::new(HashMap::new()),
                clock,
            }),
        }
    }

    /// Promote delayed jobs and detect expired leases
    fn sweep(shard: &mut Shard, now: Instant) {
        // Delayed jobs whose hold has passed become claimable
        let mut promoted = Vec::new();
        for (id, stored) in shard.jobs.iter_mut() {
            if stored.lease.is_none() && !stored.job.state.is_terminal() {
                if let Some(ready_at) = stored.ready_at {
                    if ready_at <= now {
                        stored.ready_at = None;
                        promoted.push(id.clone());
                    }
                }
            }
        }

        // Expired leases: a stall detection each
        let mut stalled = Vec::new();
        let mut dead = Vec::new();
        for (id, stored) in shard.jobs.iter_mut() {
            let expired = stored
                .lease
                .as_ref()
                .is_some_and(|lease| lease.expires_at <= now);
            if !expired {
                continue;
            }
            stored.lease = None;
            stored.stalled_count += 1;
            if stored.stalled_count >= stored.opts.max_stalled_count {
                stored.job.finish_failed("job stalled beyond allowable limit");
                stored.terminal_at = Some(now);
                dead.push((id.clone(), stored.job.parent_id.clone()));
            } else {
                stored.job.state = JobState::Stalled;
                stalled.push((id.clone(), stored.job.parent_id.clone()));
            }
        }

        for (id, parent_id) in stalled {
            tracing::warn!(job_id = %id, "lease expired, job stalled");
            shard.emit(QueueSignal::Stalled {
                job_id: id.clone(),
                parent_id,
            });
            promoted.push(id);
        }
        for (id, parent_id) in dead {
            tracing::error!(job_id = %id, "job stalled beyond allowable limit");
            shard.emit(QueueSignal::Failed {
                job_id: id,
                parent_id,
                error: "job stalled beyond allowable limit".to_string(),
            });
        }

        if !promoted.is_empty() {
            shard.ready.extend(promoted);
            shard.ready.dedup();
            shard.sort_ready();
        }
    }

    /// Drop terminal jobs past their retention age or count
    fn enforce_retention(shard: &mut Shard, now: Instant, opts: &JobOptions) {
        for (state, age, cap) in [
            (
                JobState::Completed,
                opts.remove_on_complete_age,
                opts.remove_on_complete_count,
            ),
            (
                JobState::Failed,
                opts.remove_on_fail_age,
                opts.remove_on_fail_count,
            ),
        ] {
            let mut terminal: Vec<(Instant, String)> = shard
                .jobs
                .iter()
                .filter(|(_, s)| s.job.state == state)
                .filter_map(|(id, s)| s.terminal_at.map(|at| (at, id.clone())))
                .collect();
            terminal.sort_by_key(|(at, _)| *at);

            let expired: Vec<String> = terminal
                .iter()
                .filter(|(at, _)| now.duration_since(*at) >= age)
                .map(|(_, id)| id.clone())
                .collect();
            for id in expired {
                shard.jobs.remove(&id);
            }

            let remaining = terminal
                .iter()
                .filter(|(_, id)| shard.jobs.contains_key(id))
                .count();
            if remaining > cap {
                let excess = remaining - cap;
                let drop: Vec<String> = terminal
                    .iter()
                    .filter(|(_, id)| shard.jobs.contains_key(id))
                    .take(excess)
                    .map(|(_, id)| id.clone())
                    .collect();
                for id in drop {
                    shard.jobs.remove(&id);
                }
            }
        }
    }

    fn with_leased_job<T>(
        &self,
        queue: &str,
        job_id: &str,
        token: &str,
        f: impl FnOnce(&mut Shard, Instant) -> T,
    ) -> Result<T, QueueError> {
        let now = self.inner.clock.now();
        let mut shards = self.inner.shards.lock().unwrap_or_else(|e| e.into_inner());
        let shard = shards
            .get_mut(queue)
            .ok_or_else(|| QueueError::UnknownJob(job_id.to_string()))?;
        let stored = shard
            .jobs
            .get(job_id)
            .ok_or_else(|| QueueError::UnknownJob(job_id.to_string()))?;
        match &stored.lease {
            Some(lease) if lease.token == token && lease.expires_at > now => {}
            _ => return Err(QueueError::LeaseLost(job_id.to_string())),
        }
        Ok(f(shard, now))
    }

    fn enqueue_locked(shard: &mut Shard, mut job: Job, opts: &JobOptions, now: Instant) {
        job.max_attempts = opts.attempts;
        let seq = shard.next_seq;
        shard.next_seq += 1;
        let id = job.id.clone();
        let ready_at = opts.delay.map(|d| now + d);
        shard.jobs.insert(
            id.clone(),
            StoredJob {
                job,
                opts: opts.clone(),
                seq,
                priority: opts.priority,
                ready_at,
                lease: None,
                stalled_count: 0,
                terminal_at: None,
            },
        );
        if ready_at.is_none() {
            shard.ready.push(id);
            shard.sort_ready();
        }
    }
}

#[async_trait]
impl<C: Clock> QueueBackend for MemoryQueue<C> {
    async fn enqueue(&self, queue: &str, job: Job, opts: &JobOptions) -> Result<(), QueueError> {
        let now = self.inner.clock.now();
        let mut shards = self.inner.shards.lock().unwrap_or_else(|e| e.into_inner());
        let shard = shards.entry(queue.to_string()).or_insert_with(Shard::new);
        Self::enqueue_locked(shard, job, opts, now);
        shard.notify.notify_one();
        Ok(())
    }

    async fn enqueue_batch(
        &self,
        queue: &str,
        jobs: Vec<Job>,
        opts: &JobOptions,
    ) -> Result<(), QueueError> {
        let now = self.inner.clock.now();
        let mut shards = self.inner.shards.lock().unwrap_or_else(|e| e.into_inner());
        let shard = shards.entry(queue.to_string()).or_insert_with(Shard::new);
        for job in jobs {
            Self::enqueue_locked(shard, job, opts, now);
        }
        shard.notify.notify_waiters();
        Ok(())
    }

    async fn claim(&self, queue: &str, worker: &str) -> Result<Lease, QueueError> {
        loop {
            let notify = {
                let now = self.inner.clock.now();
                let mut shards = self.inner.shards.lock().unwrap_or_else(|e| e.into_inner());
                let shard = shards.entry(queue.to_string()).or_insert_with(Shard::new);
                Self::sweep(shard, now);

                if !shard.ready.is_empty() {
                    let id = shard.ready.remove(0);
                    if let Some(stored) = shard.jobs.get_mut(&id) {
                        stored.job.begin_attempt();
                        let token = uuid::Uuid::new_v4().to_string();
                        stored.lease = Some(LeaseState {
                            token: token.clone(),
                            expires_at: now + stored.opts.lock_duration,
                        });
                        tracing::debug!(queue, job_id = %id, worker, "job claimed");
                        return Ok(Lease {
                            job: stored.job.clone(),
                            token,
                            lock_duration: stored.opts.lock_duration,
                        });
                    }
                }
                Arc::clone(&shard.notify)
            };

            // Wake on enqueue, or poll for delayed promotion and stall sweeps
            tokio::select! {
                _ = notify.notified() => {}
                _ = tokio::time::sleep(CLAIM_POLL_INTERVAL) => {}
            }
        }
    }

    async fn renew_lease(
        &self,
        queue: &str,
        job_id: &str,
        token: &str,
    ) -> Result<(), QueueError> {
        self.with_leased_job(queue, job_id, token, |shard, now| {
            if let Some(stored) = shard.jobs.get_mut(job_id) {
                let lock = stored.opts.lock_duration;
                if let Some(lease) = stored.lease.as_mut() {
                    lease.expires_at = now + lock;
                }
            }
        })
    }

    async fn complete(
        &self,
        queue: &str,
        job_id: &str,
        token: &str,
        result: serde_json::Value,
        logs: Vec<LogEntry>,
    ) -> Result<(), QueueError> {
        self.with_leased_job(queue, job_id, token, |shard, now| {
            let Some(stored) = shard.jobs.get_mut(job_id) else {
                return;
            };
            stored.lease = None;
            stored.job.logs = logs;
            stored.job.finish_completed(result.clone());
            stored.terminal_at = Some(now);
            let parent_id = stored.job.parent_id.clone();
            let opts = stored.opts.clone();
            shard.emit(QueueSignal::Completed {
                job_id: job_id.to_string(),
                parent_id,
                result,
            });
            Self::enforce_retention(shard, now, &opts);
        })
    }

    async fn fail(
        &self,
        queue: &str,
        job_id: &str,
        token: &str,
        report: FailureReport,
        logs: Vec<LogEntry>,
    ) -> Result<(), QueueError> {
        self.with_leased_job(queue, job_id, token, |shard, now| {
            let Some(stored) = shard.jobs.get_mut(job_id) else {
                return;
            };
            stored.lease = None;
            stored.job.logs = logs;

            let exhausted = stored.job.attempts >= stored.opts.attempts;
            if report.terminal || exhausted {
                stored.job.finish_failed(report.message.clone());
                stored.terminal_at = Some(now);
                let parent_id = stored.job.parent_id.clone();
                let opts = stored.opts.clone();
                shard.emit(QueueSignal::Failed {
                    job_id: job_id.to_string(),
                    parent_id,
                    error: report.message,
                });
                Self::enforce_retention(shard, now, &opts);
            } else {
                let delay = report.retry_after.unwrap_or_else(|| {
                    backoff_delay(stored.job.attempts, stored.opts.backoff_base)
                });
                stored.job.state = JobState::Waiting;
                stored.ready_at = Some(now + delay);
                tracing::debug!(
                    queue,
                    job_id,
                    attempt = stored.job.attempts,
                    delay_s = delay.as_secs(),
                    "attempt failed, retrying after backoff"
                );
            }
        })
    }

    async fn report_progress(
        &self,
        queue: &str,
        job_id: &str,
        token: &str,
        progress: u8,
    ) -> Result<(), QueueError> {
        self.with_leased_job(queue, job_id, token, |shard, _now| {
            let Some(stored) = shard.jobs.get_mut(job_id) else {
                return;
            };
            stored.job.advance_progress(progress);
            let parent_id = stored.job.parent_id.clone();
            let progress = stored.job.progress;
            shard.emit(QueueSignal::Progress {
                job_id: job_id.to_string(),
                parent_id,
                progress,
            });
        })
    }

    async fn get_job(&self, queue: &str, id: &str) -> Result<Option<Job>, QueueError> {
        let shards = self.inner.shards.lock().unwrap_or_else(|e| e.into_inner());
        Ok(shards
            .get(queue)
            .and_then(|shard| shard.jobs.get(id))
            .map(|stored| stored.job.clone()))
    }

    async fn list_by_state(
        &self,
        queue: &str,
        states: &[JobState],
    ) -> Result<Vec<Job>, QueueError> {
        let shards = self.inner.shards.lock().unwrap_or_else(|e| e.into_inner());
        let Some(shard) = shards.get(queue) else {
            return Ok(Vec::new());
        };
        let mut jobs: Vec<Job> = shard
            .jobs
            .values()
            .filter(|s| states.contains(&s.job.state))
            .map(|s| s.job.clone())
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(jobs)
    }

    async fn list_by_parent(
        &self,
        queue: &str,
        parent_id: &str,
    ) -> Result<Vec<Job>, QueueError> {
        let shards = self.inner.shards.lock().unwrap_or_else(|e| e.into_inner());
        let Some(shard) = shards.get(queue) else {
            return Ok(Vec::new());
        };
        let mut jobs: Vec<Job> = shard
            .jobs
            .values()
            .filter(|s| s.job.parent_id.as_deref() == Some(parent_id))
            .map(|s| s.job.clone())
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(jobs)
    }

    fn observe(&self, queue: &str) -> broadcast::Receiver<QueueSignal> {
        let mut shards = self.inner.shards.lock().unwrap_or_else(|e| e.into_inner());
        let shard = shards.entry(queue.to_string()).or_insert_with(Shard::new);
        shard.signals.subscribe()
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
