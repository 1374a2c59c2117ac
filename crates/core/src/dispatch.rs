// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job type to executor mapping
//!
//! The dispatcher unpacks a job's payload, coordinates authentication,
//! threads the per-job logger and cancellation token into the right
//! executor, and translates the executor's report into the job result.
//! Worker pools only see the object-safe [`JobRunner`] face, so the queue
//! layer stays unaware of executor identities.

use crate::adapters::{AccountStore, BlobFetcher, ClientFactory, ImageScaler};
use crate::auth::AuthCoordinator;
use crate::error::JobError;
use crate::exec::{
    run_chat, run_engagement, EngagementConfig, FeedSelection, PostBatchOptions, PostExecutor,
};
use crate::job::{Job, JobType};
use crate::logsink::JobLogger;
use crate::plan::{build_plan, PlanOptions, StrategyKind};
use crate::random::Rand;
use crate::session::{AccountMetadata, SessionData};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Progress sink handed to executors; percentage 0..=100
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// Object-safe face of the dispatcher, injected into worker pools
#[async_trait]
pub trait JobRunner: Send + Sync + 'static {
    async fn run(
        &self,
        job: &Job,
        log: &JobLogger,
        cancel: &CancellationToken,
        progress: &ProgressFn,
    ) -> Result<serde_json::Value, JobError>;
}

/// `engagement` job payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementPayload {
    pub session_data: SessionData,
    #[serde(default)]
    pub engagement_options: PlanOptions,
    #[serde(default = "default_strategy")]
    pub strategy_type: StrategyKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_metadata: Option<AccountMetadata>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub stop_on_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed: Option<FeedSelection>,
}

fn default_strategy() -> StrategyKind {
    StrategyKind::Uniform
}

/// `massPost` job payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MassPostPayload {
    pub session_data: SessionData,
    pub post_options: PostBatchOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_metadata: Option<AccountMetadata>,
}

/// One message or a rotation of messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

/// `chat` job payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    pub session_data: SessionData,
    pub messages: OneOrMany,
    pub recipients: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_metadata: Option<AccountMetadata>,
}

/// Concrete dispatcher over the wired capabilities
pub struct Dispatcher<F, S, BF, Sc, R> {
    factory: Arc<F>,
    coordinator: AuthCoordinator<S>,
    fetcher: Arc<BF>,
    scaler: Arc<Sc>,
    rand: R,
}

impl<F, S, BF, Sc, R> Dispatcher<F, S, BF, Sc, R>
where
    F: ClientFactory,
    S: AccountStore,
    BF: BlobFetcher,
    Sc: ImageScaler,
    R: Rand,
{
    pub fn new(
        factory: Arc<F>,
        store: Arc<S>,
        fetcher: Arc<BF>,
        scaler: Arc<Sc>,
        rand: R,
    ) -> Self {
        Self {
            factory,
            coordinator: AuthCoordinator::new(store),
            fetcher,
            scaler,
            rand,
        }
    }

    fn parse<T: serde::de::DeserializeOwned>(payload: &serde_json::Value) -> Result<T, JobError> {
        serde_json::from_value(payload.clone())
            .map_err(|e| JobError::BadRequest(format!("invalid payload: {}", e)))
    }

    fn to_result<T: Serialize>(report: &T) -> Result<serde_json::Value, JobError> {
        serde_json::to_value(report).map_err(|e| JobError::Internal(e.to_string()))
    }

    async fn run_engagement_job(
        &self,
        job: &Job,
        log: &JobLogger,
        cancel: &CancellationToken,
        progress: &ProgressFn,
    ) -> Result<serde_json::Value, JobError> {
        let payload: EngagementPayload = Self::parse(&job.payload)?;
        let metadata = payload.account_metadata.unwrap_or_default();
        let client = self.factory.create(&metadata);

        let mut session = payload.session_data;
        self.coordinator
            .establish(&client, &mut session, &metadata, log)
            .await?;

        let mut plan = build_plan(&payload.engagement_options, payload.strategy_type, &self.rand);
        log.info(format!(
            "planned {} actions: {} likes, {} reposts, ~{}s",
            plan.len(),
            plan.like_count,
            plan.repost_count,
            plan.total_time_s
        ));

        let config = EngagementConfig {
            dry_run: payload.dry_run,
            stop_on_error: payload.stop_on_error,
            feed: payload.feed.unwrap_or(FeedSelection::Timeline),
        };
        let total = plan.len().max(1);
        let on_progress = progress.as_ref();
        let report = run_engagement(&client, &mut plan, None, &config, log, cancel, |_, i| {
            on_progress(((i + 1) * 100 / total) as u8);
        })
        .await?;

        Self::to_result(&report)
    }

    async fn run_mass_post_job(
        &self,
        job: &Job,
        log: &JobLogger,
        cancel: &CancellationToken,
        progress: &ProgressFn,
    ) -> Result<serde_json::Value, JobError> {
        let payload: MassPostPayload = Self::parse(&job.payload)?;
        if payload.post_options.posts.is_empty() {
            return Err(JobError::BadRequest("empty post batch".to_string()));
        }
        let metadata = payload.account_metadata.unwrap_or_default();
        let client = self.factory.create(&metadata);

        let mut session = payload.session_data;
        self.coordinator
            .establish(&client, &mut session, &metadata, log)
            .await?;

        let executor = PostExecutor {
            client: &client,
            coordinator: &self.coordinator,
            fetcher: self.fetcher.as_ref(),
            scaler: self.scaler.as_ref(),
            rand: &self.rand,
        };
        let total = payload.post_options.posts.len().max(1);
        let on_progress = progress.as_ref();
        let report = executor
            .run(&mut session, &metadata, &payload.post_options, log, cancel, |i| {
                on_progress(((i + 1) * 100 / total) as u8);
            })
            .await?;

        Self::to_result(&report)
    }

    async fn run_chat_job(
        &self,
        job: &Job,
        log: &JobLogger,
        cancel: &CancellationToken,
        progress: &ProgressFn,
    ) -> Result<serde_json::Value, JobError> {
        let payload: ChatPayload = Self::parse(&job.payload)?;
        if payload.recipients.is_empty() {
            return Err(JobError::BadRequest("no recipients".to_string()));
        }
        let metadata = payload.account_metadata.unwrap_or_default();
        let client = self.factory.create(&metadata);

        let mut session = payload.session_data;
        self.coordinator
            .establish(&client, &mut session, &metadata, log)
            .await?;

        let messages = payload.messages.into_vec();
        let total = payload.recipients.len().max(1);
        let on_progress = progress.as_ref();
        let report = run_chat(
            &client,
            &messages,
            &payload.recipients,
            log,
            cancel,
            |i| {
                on_progress(((i + 1) * 100 / total) as u8);
            },
        )
        .await?;

        Self::to_result(&report)
    }
}

#[async_trait]
impl<F, S, BF, Sc, R> JobRunner for Dispatcher<F, S, BF, Sc, R>
where
    F: ClientFactory,
    S: AccountStore,
    BF: BlobFetcher,
    Sc: ImageScaler,
    R: Rand,
{
    async fn run(
        &self,
        job: &Job,
        log: &JobLogger,
        cancel: &CancellationToken,
        progress: &ProgressFn,
    ) -> Result<serde_json::Value, JobError> {
        match job.job_type {
            JobType::Engagement => self.run_engagement_job(job, log, cancel, progress).await,
            JobType::MassPost => self.run_mass_post_job(job, log, cancel, progress).await,
            JobType::Chat => self.run_chat_job(job, log, cancel, progress).await,
        }
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
