// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capability trait definitions for external integrations

use crate::error::JobError;
use crate::session::{AccountMetadata, SessionData};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Social client
// =============================================================================

/// Errors from the social client
#[derive(Debug, Error)]
pub enum SocialError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("upstream error: {0}")]
    Upstream(String),
}

impl From<SocialError> for JobError {
    fn from(e: SocialError) -> Self {
        match e {
            SocialError::RateLimited(msg) => JobError::RateLimited(msg),
            SocialError::Auth(msg) => JobError::Upstream(format!("auth: {}", msg)),
            SocialError::Upstream(msg) => JobError::Upstream(msg),
        }
    }
}

/// Tokens returned by a successful login or refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub did: String,
    pub email: Option<String>,
}

/// Reference to an uploaded blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRef {
    pub cid: String,
    pub mime: String,
    pub size: usize,
}

/// Reference to a created post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRef {
    pub uri: String,
    pub cid: String,
}

/// A post as it appears in a fetched feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedPost {
    pub uri: String,
    pub cid: String,
    pub author_handle: String,
    /// Raw record; the post text when `record.text` is a string
    pub record: serde_json::Value,
}

impl FeedPost {
    /// The record text when a string, otherwise a JSON rendering
    pub fn text(&self) -> String {
        match self.record.get("text") {
            Some(serde_json::Value::String(s)) => s.clone(),
            _ => self.record.to_string(),
        }
    }
}

/// One feed slot; the post reference may be missing on malformed items
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedItem {
    pub post: Option<FeedPost>,
}

impl FeedItem {
    pub fn of(post: FeedPost) -> Self {
        Self { post: Some(post) }
    }
}

/// The social-network capability
///
/// Only the operations the executors need; the protocol itself is out of
/// scope and lives behind whatever implements this trait.
#[async_trait]
pub trait SocialClient: Send + Sync {
    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthTokens, SocialError>;
    async fn resume_session(&self, session: &SessionData) -> Result<(), SocialError>;
    async fn login(&self, identifier: &str, password: &str) -> Result<AuthTokens, SocialError>;
    /// Whether the client currently holds a usable session
    async fn has_session(&self) -> bool;

    async fn create_post(
        &self,
        text: &str,
        embed: Option<&BlobRef>,
        alt: Option<&str>,
    ) -> Result<PostRef, SocialError>;
    async fn like(&self, uri: &str, cid: &str) -> Result<(), SocialError>;
    async fn repost(&self, uri: &str, cid: &str) -> Result<(), SocialError>;
    async fn follow(&self, did: &str) -> Result<(), SocialError>;
    async fn reply(&self, parent: &PostRef, text: &str) -> Result<PostRef, SocialError>;

    async fn get_timeline(&self, limit: usize) -> Result<Vec<FeedItem>, SocialError>;
    async fn get_hot_feed(&self, limit: usize) -> Result<Vec<FeedItem>, SocialError>;

    async fn upload_blob(&self, bytes: Vec<u8>, mime: &str) -> Result<BlobRef, SocialError>;
    /// Update the profile's pinned-post reference; `None` clears it
    async fn upsert_profile(&self, pinned_post: Option<&PostRef>) -> Result<(), SocialError>;

    async fn start_conversation(&self, handle: &str) -> Result<String, SocialError>;
    async fn send_dm(&self, convo_id: &str, text: &str) -> Result<(), SocialError>;
    async fn list_conversations(&self) -> Result<Vec<String>, SocialError>;
}

/// Builds a client bound to one account's proxy, user agent, and endpoint
pub trait ClientFactory: Send + Sync + 'static {
    type Client: SocialClient;

    fn create(&self, metadata: &AccountMetadata) -> Self::Client;
}

// =============================================================================
// Account store
// =============================================================================

/// Errors from the account store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("category not found: {0}")]
    CategoryNotFound(String),
    #[error("store error: {0}")]
    Backend(String),
}

/// One account row as read from the store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    pub account_id: String,
    pub session: SessionData,
    pub metadata: AccountMetadata,
}

/// Rotated credentials pushed back after a successful auth
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenUpdate {
    pub access_token: String,
    pub refresh_token: String,
    pub did: Option<String>,
    pub email: Option<String>,
}

/// The account/credential store capability
#[async_trait]
pub trait AccountStore: Send + Sync + 'static {
    async fn list_by_category(&self, category_id: &str)
        -> Result<Vec<AccountRecord>, StoreError>;
    async fn update_tokens(&self, account_id: &str, update: TokenUpdate)
        -> Result<(), StoreError>;
}

// =============================================================================
// Blob fetching and image scaling
// =============================================================================

/// Errors resolving an image URL to bytes
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("unsupported url: {0}")]
    Unsupported(String),
    #[error("fetch failed: {0}")]
    Failed(String),
}

/// Raw bytes plus the mime type they were served with
#[derive(Debug, Clone)]
pub struct FetchedBlob {
    pub bytes: Vec<u8>,
    pub mime: String,
}

/// Resolves `http(s)` image URLs to bytes
#[async_trait]
pub trait BlobFetcher: Send + Sync + 'static {
    async fn fetch(&self, url: &str) -> Result<FetchedBlob, FetchError>;
}

/// Errors from the image pipeline
#[derive(Debug, Error)]
pub enum ScaleError {
    /// No image pipeline is wired into this deployment
    #[error("image pipeline unavailable")]
    Unavailable,
    #[error("downscale failed: {0}")]
    Failed(String),
}

/// Re-encodes an oversized image to fit the upload cap
pub trait ImageScaler: Send + Sync + 'static {
    fn downscale(&self, bytes: &[u8], max_width: u32, quality: u8) -> Result<Vec<u8>, ScaleError>;
}

/// Deployment without an image pipeline; oversized blobs become
/// item-level failures instead of truncated uploads.
#[derive(Clone, Copy, Default)]
pub struct NoScaler;

impl ImageScaler for NoScaler {
    fn downscale(&self, _bytes: &[u8], _max_width: u32, _quality: u8) -> Result<Vec<u8>, ScaleError> {
        Err(ScaleError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_post_text_prefers_record_text() {
        let post = FeedPost {
            uri: "at://a/post/1".into(),
            cid: "cid1".into(),
            author_handle: "ana.social".into(),
            record: serde_json::json!({"text": "hello", "langs": ["en"]}),
        };
        assert_eq!(post.text(), "hello");
    }

    #[test]
    fn feed_post_text_falls_back_to_json() {
        let post = FeedPost {
            uri: "at://a/post/2".into(),
            cid: "cid2".into(),
            author_handle: "ana.social".into(),
            record: serde_json::json!({"embed": {"kind": "image"}}),
        };
        assert!(post.text().contains("embed"));
    }

    #[test]
    fn rate_limit_maps_to_retriable_job_error() {
        let err: JobError = SocialError::RateLimited("slow down".into()).into();
        assert!(err.is_retriable());
        let err: JobError = SocialError::Upstream("502".into()).into();
        assert!(err.is_retriable());
    }

    #[test]
    fn no_scaler_reports_unavailable() {
        let result = NoScaler.downscale(&[0u8; 16], 1280, 80);
        assert!(matches!(result, Err(ScaleError::Unavailable)));
    }
}
