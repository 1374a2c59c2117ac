// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for job execution
//!
//! Executors never retry transient errors on their own; they raise and let
//! the queue backend decide retry vs terminal by attempt count.

use thiserror::Error;

/// Job-level error taxonomy
#[derive(Debug, Error)]
pub enum JobError {
    /// Payload validation failed at intake
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Job or parent not found
    #[error("not found: {0}")]
    NotFound(String),

    /// All three auth methods failed; terminal for the attempt chain
    #[error("auth exhausted: {0}")]
    AuthExhausted(String),

    /// Social client call failed; retriable by queue policy
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// Upstream rate limit; retriable, mandates backoff
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Blob exceeds the upload cap and could not be downscaled
    #[error("blob too large: {size} bytes exceeds cap of {cap}")]
    BlobTooLarge { size: usize, cap: usize },

    /// Lease revoked; the job returns to waiting
    #[error("cancelled")]
    Cancelled,

    /// Queue detected missed lease renewals beyond threshold
    #[error("stalled")]
    Stalled,

    #[error("internal: {0}")]
    Internal(String),
}

impl JobError {
    /// Whether the queue should re-deliver a job that failed with this error.
    ///
    /// AuthExhausted is terminal after one coordination attempt per job: a
    /// bad password must not silently burn the whole retry budget.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            JobError::Upstream(_) | JobError::RateLimited(_) | JobError::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retriable() {
        assert!(JobError::Upstream("flap".into()).is_retriable());
        assert!(JobError::RateLimited("429".into()).is_retriable());
        assert!(JobError::Cancelled.is_retriable());
    }

    #[test]
    fn auth_exhausted_is_terminal() {
        assert!(!JobError::AuthExhausted("bad password".into()).is_retriable());
        assert!(!JobError::BadRequest("missing field".into()).is_retriable());
        assert!(!JobError::Internal("bug".into()).is_retriable());
    }

    #[test]
    fn blob_too_large_names_both_sizes() {
        let e = JobError::BlobTooLarge {
            size: 972_800,
            cap: 921_600,
        };
        assert_eq!(
            e.to_string(),
            "blob too large: 972800 bytes exceeds cap of 921600"
        );
    }
}
