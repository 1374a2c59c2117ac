// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker pools: bounded concurrency per queue
//!
//! Each pool runs `C` worker tasks that loop claim -> dispatch -> report.
//! While a job runs, a background ticker renews the lease at a third of
//! the lock duration; a renewal failure cancels the job so the executor
//! unwinds at its next suspension point. Stall detection belongs to the
//! queue backend; the pool never force-kills a job.

use crate::dispatch::{JobRunner, ProgressFn};
use crate::event::Event;
use crate::events::EventBus;
use crate::logsink::JobLogger;
use crate::queue::{FailureReport, Lease, QueueBackend};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Default workers per queue
pub const DEFAULT_CONCURRENCY: usize = 3;
/// Workers per queue when a pool is bootstrapped from a live connection
pub const LIVE_CONCURRENCY: usize = 5;

/// Pool tuning
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub concurrency: usize,
    /// How long in-flight jobs get to finish on graceful shutdown
    pub drain_deadline: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            drain_deadline: Duration::from_secs(30),
        }
    }
}

/// Shared dependencies for worker tasks
pub struct WorkerContext<B: QueueBackend> {
    pub backend: Arc<B>,
    pub bus: EventBus,
    pub runner: Arc<dyn JobRunner>,
}

impl<B: QueueBackend> Clone for WorkerContext<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            bus: self.bus.clone(),
            runner: Arc::clone(&self.runner),
        }
    }
}

/// Bounded-concurrency worker pool over one queue
pub struct WorkerPool {
    queue: String,
    concurrency: usize,
    quit: CancellationToken,
    drain_deadline: Duration,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn the pool's workers immediately
    pub fn start<B: QueueBackend>(
        queue: impl Into<String>,
        config: PoolConfig,
        ctx: WorkerContext<B>,
    ) -> Self {
        let queue = queue.into();
        let quit = CancellationToken::new();

        let workers = (0..config.concurrency)
            .map(|i| {
                let worker_id = format!("{}:w{}", queue, i + 1);
                tokio::spawn(worker_loop(
                    queue.clone(),
                    worker_id,
                    ctx.clone(),
                    quit.clone(),
                    config.drain_deadline,
                ))
            })
            .collect();

        tracing::info!(queue = %queue, concurrency = config.concurrency, "worker pool started");
        WorkerPool {
            queue,
            concurrency: config.concurrency,
            quit,
            drain_deadline: config.drain_deadline,
            workers,
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Stop claiming and drain in-flight work with a deadline. Leases that
    /// do not finish in time lapse and the backend redelivers the jobs.
    pub async fn shutdown(self) {
        tracing::info!(queue = %self.queue, "worker pool draining");
        self.quit.cancel();
        let deadline = self.drain_deadline + Duration::from_secs(1);
        for handle in self.workers {
            if tokio::time::timeout(deadline, handle).await.is_err() {
                tracing::warn!(queue = %self.queue, "worker did not drain in time");
            }
        }
    }
}

async fn worker_loop<B: QueueBackend>(
    queue: String,
    worker_id: String,
    ctx: WorkerContext<B>,
    quit: CancellationToken,
    drain_deadline: Duration,
) {
    loop {
        let lease = tokio::select! {
            _ = quit.cancelled() => break,
            claimed = ctx.backend.claim(&queue, &worker_id) => match claimed {
                Ok(lease) => lease,
                Err(e) => {
                    tracing::error!(queue = %queue, worker = %worker_id, error = %e, "claim failed");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            }
        };

        run_one(&queue, &worker_id, lease, &ctx, &quit, drain_deadline).await;
    }
    tracing::debug!(worker = %worker_id, "worker stopped");
}

async fn run_one<B: QueueBackend>(
    queue: &str,
    worker_id: &str,
    lease: Lease,
    ctx: &WorkerContext<B>,
    quit: &CancellationToken,
    drain_deadline: Duration,
) {
    let job = lease.job;
    let token = lease.token;

    ctx.bus.publish(Event::JobStarted {
        tenant_id: job.tenant_id.clone(),
        job_id: job.id.clone(),
        parent_id: job.parent_id.clone(),
        job_type: job.job_type,
        attempt: job.attempts,
    });

    let log = JobLogger::new(
        ctx.bus.clone(),
        &job.tenant_id,
        &job.id,
        job.parent_id.clone(),
    );
    let job_cancel = CancellationToken::new();

    // Lease renewal at a third of the lock duration; losing the lease
    // cancels the job.
    let renew_stop = CancellationToken::new();
    let renew_task = tokio::spawn({
        let backend = Arc::clone(&ctx.backend);
        let queue = queue.to_string();
        let job_id = job.id.clone();
        let token = token.clone();
        let job_cancel = job_cancel.clone();
        let renew_stop = renew_stop.clone();
        let interval = lease.lock_duration / 3;
        async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = renew_stop.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = backend.renew_lease(&queue, &job_id, &token).await {
                            tracing::warn!(job_id = %job_id, error = %e, "lease renewal failed, cancelling job");
                            job_cancel.cancel();
                            break;
                        }
                    }
                }
            }
        }
    });

    // On graceful shutdown, give the executor the drain window, then cancel
    let drain_task = tokio::spawn({
        let quit = quit.clone();
        let job_cancel = job_cancel.clone();
        async move {
            quit.cancelled().await;
            tokio::time::sleep(drain_deadline).await;
            job_cancel.cancel();
        }
    });

    // Executors report progress synchronously; a forwarder task carries it
    // to the backend.
    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<u8>();
    let progress_task = tokio::spawn({
        let backend = Arc::clone(&ctx.backend);
        let queue = queue.to_string();
        let job_id = job.id.clone();
        let token = token.clone();
        async move {
            while let Some(pct) = progress_rx.recv().await {
                if backend
                    .report_progress(&queue, &job_id, &token, pct)
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }
    });
    let progress: ProgressFn = Arc::new(move |pct| {
        let _ = progress_tx.send(pct);
    });

    let result = ctx.runner.run(&job, &log, &job_cancel, &progress).await;

    renew_stop.cancel();
    drain_task.abort();
    let _ = renew_task.await;
    drop(progress);
    let _ = progress_task.await;

    if let Err(e) = &result {
        log.error(format!("job failed: {}", e));
    }
    log.freeze();
    let logs = log.snapshot();

    let reported = match result {
        Ok(value) => {
            tracing::info!(queue, worker = %worker_id, job_id = %job.id, "job completed");
            ctx.backend
                .complete(queue, &job.id, &token, value, logs)
                .await
        }
        Err(e) => {
            tracing::warn!(queue, worker = %worker_id, job_id = %job.id, error = %e, "job failed");
            ctx.backend
                .fail(queue, &job.id, &token, FailureReport::from_error(&e), logs)
                .await
        }
    };

    if let Err(e) = reported {
        tracing::error!(job_id = %job.id, error = %e, "could not report job outcome");
        ctx.bus.publish(Event::WorkerError {
            tenant_id: job.tenant_id.clone(),
            queue: queue.to_string(),
            message: e.to_string(),
        });
    }
}

/// Pools per queue, replace-on-create semantics
pub struct WorkerFleet<B: QueueBackend> {
    ctx: WorkerContext<B>,
    config: PoolConfig,
    pools: tokio::sync::Mutex<HashMap<String, WorkerPool>>,
}

impl<B: QueueBackend> WorkerFleet<B> {
    pub fn new(ctx: WorkerContext<B>, config: PoolConfig) -> Self {
        Self {
            ctx,
            config,
            pools: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Start a pool for the queue if none is running
    pub async fn ensure_pool(&self, queue: &str) {
        let mut pools = self.pools.lock().await;
        if pools.contains_key(queue) {
            return;
        }
        let pool = WorkerPool::start(queue, self.config.clone(), self.ctx.clone());
        pools.insert(queue.to_string(), pool);
    }

    /// Replace any existing pool on the queue after a graceful close.
    /// A pool already at the requested concurrency is left alone.
    pub async fn replace_pool(&self, queue: &str, concurrency: usize) {
        let previous = {
            let mut pools = self.pools.lock().await;
            if pools
                .get(queue)
                .is_some_and(|pool| pool.concurrency() == concurrency)
            {
                return;
            }
            pools.remove(queue)
        };
        if let Some(pool) = previous {
            pool.shutdown().await;
        }

        let config = PoolConfig {
            concurrency,
            ..self.config.clone()
        };
        let pool = WorkerPool::start(queue, config, self.ctx.clone());
        self.pools.lock().await.insert(queue.to_string(), pool);
    }

    pub async fn pool_count(&self) -> usize {
        self.pools.lock().await.len()
    }

    /// Drain every pool
    pub async fn shutdown_all(&self) {
        let pools: Vec<WorkerPool> = {
            let mut guard = self.pools.lock().await;
            guard.drain().map(|(_, pool)| pool).collect()
        };
        for pool in pools {
            pool.shutdown().await;
        }
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
