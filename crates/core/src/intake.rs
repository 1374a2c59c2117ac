// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command surface: enqueue single, bulk, and per-category jobs
//!
//! Validation happens here, before anything touches the backend; a payload
//! that does not parse for its job type is a `BadRequest`. Bulk children
//! carry a shared parent id and encode it in their own ids.

use crate::adapters::{AccountStore, StoreError};
use crate::dispatch::{ChatPayload, EngagementPayload, MassPostPayload};
use crate::error::JobError;
use crate::event::Event;
use crate::events::EventBus;
use crate::id::IdGen;
use crate::job::{Job, JobType};
use crate::queue::{JobOptions, QueueBackend};
use crate::registry::{queue_name, QueueRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Wire-level enqueue options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnqueueOpts {
    pub priority: Option<i32>,
    pub delay_s: Option<u64>,
    pub attempts: Option<u32>,
}

impl EnqueueOpts {
    fn apply(&self, base: &JobOptions) -> JobOptions {
        let mut opts = base.clone();
        if let Some(priority) = self.priority {
            opts.priority = priority;
        }
        if let Some(delay_s) = self.delay_s {
            opts.delay = Some(Duration::from_secs(delay_s));
        }
        if let Some(attempts) = self.attempts {
            opts.attempts = attempts.max(1);
        }
        opts
    }
}

/// Result of a bulk enqueue
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkReceipt {
    pub parent_id: String,
    pub job_ids: Vec<String>,
}

/// Result of a per-category enqueue
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryReceipt {
    pub parent_id: String,
    pub job_ids: Vec<String>,
    pub account_count: usize,
}

/// Called with the queue name whenever a queue is first created
pub type QueueCreatedHook = Arc<dyn Fn(String) + Send + Sync>;

/// Thin command surface over the registry and backend
pub struct Intake<B: QueueBackend, S: AccountStore, I: IdGen> {
    registry: Arc<QueueRegistry<B>>,
    store: Arc<S>,
    id_gen: I,
    bus: EventBus,
    queue_created: Option<QueueCreatedHook>,
}

impl<B: QueueBackend, S: AccountStore, I: IdGen> Intake<B, S, I> {
    pub fn new(
        registry: Arc<QueueRegistry<B>>,
        store: Arc<S>,
        id_gen: I,
        bus: EventBus,
    ) -> Self {
        Self {
            registry,
            store,
            id_gen,
            bus,
            queue_created: None,
        }
    }

    /// Install a hook fired when a queue is first created (the daemon uses
    /// this to start the queue's worker pool).
    pub fn on_queue_created(mut self, hook: QueueCreatedHook) -> Self {
        self.queue_created = Some(hook);
        self
    }

    fn ensure_queue(&self, tenant_id: &str, job_type: JobType) -> String {
        let (name, created) = self.registry.get_or_create(tenant_id, job_type);
        if created {
            if let Some(hook) = &self.queue_created {
                hook(name.clone());
            }
        }
        name
    }

    /// Enqueue one job; returns its id
    pub async fn enqueue(
        &self,
        tenant_id: &str,
        job_type: JobType,
        payload: serde_json::Value,
        opts: &EnqueueOpts,
    ) -> Result<String, JobError> {
        validate_payload(job_type, &payload)?;
        let queue = self.ensure_queue(tenant_id, job_type);
        let options = opts.apply(self.registry.options());

        let id = self.id_gen.next();
        let job = Job::new(&id, tenant_id, job_type, payload);
        self.registry
            .backend()
            .enqueue(&queue, job, &options)
            .await
            .map_err(|e| JobError::Internal(e.to_string()))?;

        self.bus.publish(Event::JobAdded {
            tenant_id: tenant_id.to_string(),
            job_id: id.clone(),
            parent_id: None,
            job_type,
        });
        tracing::debug!(queue = %queue, job_id = %id, "job enqueued");
        Ok(id)
    }

    /// Enqueue many payloads under one parent id
    pub async fn enqueue_bulk(
        &self,
        tenant_id: &str,
        job_type: JobType,
        payloads: Vec<serde_json::Value>,
        opts: &EnqueueOpts,
    ) -> Result<BulkReceipt, JobError> {
        if payloads.is_empty() {
            return Err(JobError::BadRequest("empty bulk".to_string()));
        }
        for (i, payload) in payloads.iter().enumerate() {
            validate_payload(job_type, payload)
                .map_err(|e| JobError::BadRequest(format!("item {}: {}", i, e)))?;
        }

        let queue = self.ensure_queue(tenant_id, job_type);
        let options = opts.apply(self.registry.options());
        let parent_id = self.id_gen.next();

        let jobs: Vec<Job> = payloads
            .into_iter()
            .map(|payload| {
                let id = self.id_gen.child(&parent_id);
                Job::new(id, tenant_id, job_type, payload).with_parent(&parent_id)
            })
            .collect();
        let job_ids: Vec<String> = jobs.iter().map(|j| j.id.clone()).collect();

        self.registry
            .backend()
            .enqueue_batch(&queue, jobs, &options)
            .await
            .map_err(|e| JobError::Internal(e.to_string()))?;

        for job_id in &job_ids {
            self.bus.publish(Event::JobAdded {
                tenant_id: tenant_id.to_string(),
                job_id: job_id.clone(),
                parent_id: Some(parent_id.clone()),
                job_type,
            });
        }
        tracing::info!(queue = %queue, parent_id = %parent_id, count = job_ids.len(), "bulk enqueued");
        Ok(BulkReceipt { parent_id, job_ids })
    }

    /// Expand one job per account in the category, all under one parent.
    /// Each child gets the shared payload plus that account's session and
    /// metadata.
    pub async fn enqueue_by_category(
        &self,
        tenant_id: &str,
        job_type: JobType,
        category_id: &str,
        shared_payload: serde_json::Value,
        opts: &EnqueueOpts,
    ) -> Result<CategoryReceipt, JobError> {
        let shared = shared_payload
            .as_object()
            .cloned()
            .ok_or_else(|| JobError::BadRequest("shared payload must be an object".to_string()))?;

        let accounts = match self.store.list_by_category(category_id).await {
            Ok(accounts) => accounts,
            Err(StoreError::CategoryNotFound(id)) => {
                return Err(JobError::NotFound(format!("category {}", id)))
            }
            Err(e) => return Err(JobError::Internal(e.to_string())),
        };

        let mut payloads = Vec::with_capacity(accounts.len());
        for account in &accounts {
            let mut payload = shared.clone();
            payload.insert(
                "sessionData".to_string(),
                serde_json::to_value(&account.session)
                    .map_err(|e| JobError::Internal(e.to_string()))?,
            );
            payload.insert(
                "accountMetadata".to_string(),
                serde_json::to_value(&account.metadata)
                    .map_err(|e| JobError::Internal(e.to_string()))?,
            );
            payloads.push(serde_json::Value::Object(payload));
        }

        let account_count = payloads.len();
        if account_count == 0 {
            return Ok(CategoryReceipt {
                parent_id: self.id_gen.next(),
                job_ids: Vec::new(),
                account_count: 0,
            });
        }

        let receipt = self
            .enqueue_bulk(tenant_id, job_type, payloads, opts)
            .await?;
        Ok(CategoryReceipt {
            parent_id: receipt.parent_id,
            job_ids: receipt.job_ids,
            account_count,
        })
    }

    /// Full projection of one job, including its log lines
    pub async fn get_job(
        &self,
        tenant_id: &str,
        job_type: JobType,
        job_id: &str,
    ) -> Result<Job, JobError> {
        let queue = queue_name(tenant_id, job_type);
        self.registry
            .backend()
            .get_job(&queue, job_id)
            .await
            .map_err(|e| JobError::Internal(e.to_string()))?
            .ok_or_else(|| JobError::NotFound(format!("job {}", job_id)))
    }

    /// All children of a bulk parent, oldest first
    pub async fn list_jobs_by_parent(
        &self,
        tenant_id: &str,
        job_type: JobType,
        parent_id: &str,
    ) -> Result<Vec<Job>, JobError> {
        let queue = queue_name(tenant_id, job_type);
        self.registry
            .backend()
            .list_by_parent(&queue, parent_id)
            .await
            .map_err(|e| JobError::Internal(e.to_string()))
    }
}

/// Check a payload parses for its job type
pub fn validate_payload(job_type: JobType, payload: &serde_json::Value) -> Result<(), JobError> {
    fn parse<T: serde::de::DeserializeOwned>(
        payload: &serde_json::Value,
    ) -> Result<T, JobError> {
        serde_json::from_value(payload.clone())
            .map_err(|e| JobError::BadRequest(format!("invalid payload: {}", e)))
    }

    match job_type {
        JobType::Engagement => {
            parse::<EngagementPayload>(payload)?;
        }
        JobType::MassPost => {
            let parsed: MassPostPayload = parse(payload)?;
            if parsed.post_options.posts.is_empty() {
                return Err(JobError::BadRequest("empty post batch".to_string()));
            }
        }
        JobType::Chat => {
            let parsed: ChatPayload = parse(payload)?;
            if parsed.recipients.is_empty() {
                return Err(JobError::BadRequest("no recipients".to_string()));
            }
            if parsed.messages.into_vec().is_empty() {
                return Err(JobError::BadRequest("no messages".to_string()));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "intake_tests.rs"]
mod tests;
