// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One logical queue per `(tenant, job type)`
//!
//! The registry lazily creates queues and, on creation, subscribes each
//! queue's observation stream, projecting backend signals into the event
//! bus tagged with the owning tenant. The registry never learns executor
//! identities; only the dispatcher maps job types to code.

use crate::event::Event;
use crate::events::EventBus;
use crate::job::JobType;
use crate::queue::{JobOptions, QueueBackend, QueueSignal};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Deterministic queue naming
pub fn queue_name(tenant_id: &str, job_type: JobType) -> String {
    format!("bsky-{}-{}", job_type.as_str(), tenant_id)
}

/// A created queue and its projection task
pub struct QueueHandle {
    pub name: String,
    pub tenant_id: String,
    pub job_type: JobType,
    projection: JoinHandle<()>,
}

impl Drop for QueueHandle {
    fn drop(&mut self) {
        self.projection.abort();
    }
}

/// Lazy map of queues, namespaced by tenant and job type
pub struct QueueRegistry<B: QueueBackend> {
    backend: Arc<B>,
    bus: EventBus,
    options: JobOptions,
    queues: Mutex<HashMap<String, QueueHandle>>,
}

impl<B: QueueBackend> QueueRegistry<B> {
    pub fn new(backend: Arc<B>, bus: EventBus) -> Self {
        Self::with_options(backend, bus, JobOptions::default())
    }

    pub fn with_options(backend: Arc<B>, bus: EventBus, options: JobOptions) -> Self {
        Self {
            backend,
            bus,
            options,
            queues: Mutex::new(HashMap::new()),
        }
    }

    /// Default enqueue options for every queue this registry owns
    pub fn options(&self) -> &JobOptions {
        &self.options
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Look up or create the queue; returns `(name, created)`
    pub fn get_or_create(&self, tenant_id: &str, job_type: JobType) -> (String, bool) {
        let name = queue_name(tenant_id, job_type);
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        if queues.contains_key(&name) {
            return (name, false);
        }

        tracing::info!(queue = %name, tenant_id, "creating queue");
        let projection = spawn_projection(
            Arc::clone(&self.backend),
            self.bus.clone(),
            name.clone(),
            tenant_id.to_string(),
        );
        queues.insert(
            name.clone(),
            QueueHandle {
                name: name.clone(),
                tenant_id: tenant_id.to_string(),
                job_type,
                projection,
            },
        );
        (name, true)
    }

    pub fn queue_names(&self) -> Vec<String> {
        self.queues
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    /// Drop all queues and stop their projections
    pub fn shutdown(&self) {
        self.queues
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

/// Project a queue's observation stream into bus events
fn spawn_projection<B: QueueBackend>(
    backend: Arc<B>,
    bus: EventBus,
    queue: String,
    tenant_id: String,
) -> JoinHandle<()> {
    let mut rx = backend.observe(&queue);
    tokio::spawn(async move {
        loop {
            let signal = match rx.recv().await {
                Ok(signal) => signal,
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(queue = %queue, missed, "observation stream lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let event = match signal {
                QueueSignal::Completed {
                    job_id,
                    parent_id,
                    result,
                } => Event::JobCompleted {
                    tenant_id: tenant_id.clone(),
                    job_id,
                    parent_id,
                    result,
                },
                QueueSignal::Failed {
                    job_id,
                    parent_id,
                    error,
                } => Event::JobFailed {
                    tenant_id: tenant_id.clone(),
                    job_id,
                    parent_id,
                    error,
                },
                QueueSignal::Progress {
                    job_id,
                    parent_id,
                    progress,
                } => Event::JobProgress {
                    tenant_id: tenant_id.clone(),
                    job_id,
                    parent_id,
                    progress,
                },
                QueueSignal::Stalled { job_id, parent_id } => Event::JobStalled {
                    tenant_id: tenant_id.clone(),
                    job_id,
                    parent_id,
                },
            };
            bus.publish(event);
        }
    })
}
