// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job executors
//!
//! Executors are plain async functions over an authenticated client, a
//! per-job logger, and a cancellation token tied to the job's lease. They
//! never retry transient errors; the queue owns retry policy.

mod chat;
mod engage;
mod post;

pub use chat::{run_chat, ChatOutcome, ChatReport};
pub use engage::{
    run_engagement, EngagementConfig, EngagementOutcome, EngagementReport, FeedSelection,
};
pub use post::{
    PostBatchOptions, PostExecutor, PostItem, PostOutcome, PostReport, PostStats, BLOB_CAP_BYTES,
    DEFAULT_POST_DELAY_RANGE, JPEG_QUALITY, MAX_IMAGE_WIDTH,
};

use crate::error::JobError;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Sleep that observes lease cancellation
pub(crate) async fn paced_sleep(secs: u64, cancel: &CancellationToken) -> Result<(), JobError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(JobError::Cancelled),
        _ = tokio::time::sleep(Duration::from_secs(secs)) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn paced_sleep_completes() {
        let cancel = CancellationToken::new();
        assert!(paced_sleep(30, &cancel).await.is_ok());
    }

    #[tokio::test]
    async fn paced_sleep_observes_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = paced_sleep(3600, &cancel).await.unwrap_err();
        assert!(matches!(err, JobError::Cancelled));
    }
}
