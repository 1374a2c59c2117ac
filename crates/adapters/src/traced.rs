// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced wrapper for consistent social-client observability

use async_trait::async_trait;
use murmur_core::adapters::{
    AuthTokens, BlobRef, FeedItem, PostRef, SocialClient, SocialError,
};
use murmur_core::session::SessionData;

/// Wrapper that adds tracing to any SocialClient
#[derive(Clone)]
pub struct TracedSocialClient<C> {
    inner: C,
}

impl<C> TracedSocialClient<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

fn observe<T>(op: &'static str, result: &Result<T, SocialError>, started: std::time::Instant) {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match result {
        Ok(_) => tracing::debug!(op, elapsed_ms, "social call ok"),
        Err(e) => tracing::warn!(op, elapsed_ms, error = %e, "social call failed"),
    }
}

macro_rules! traced {
    ($op:literal, $call:expr) => {{
        let started = std::time::Instant::now();
        let result = $call.await;
        observe($op, &result, started);
        result
    }};
}

#[async_trait]
impl<C: SocialClient> SocialClient for TracedSocialClient<C> {
    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthTokens, SocialError> {
        traced!("refresh_session", self.inner.refresh_session(refresh_token))
    }

    async fn resume_session(&self, session: &SessionData) -> Result<(), SocialError> {
        traced!("resume_session", self.inner.resume_session(session))
    }

    async fn login(&self, identifier: &str, password: &str) -> Result<AuthTokens, SocialError> {
        // Never log the password, only who is logging in
        tracing::debug!(identifier, "logging in");
        traced!("login", self.inner.login(identifier, password))
    }

    async fn has_session(&self) -> bool {
        self.inner.has_session().await
    }

    async fn create_post(
        &self,
        text: &str,
        embed: Option<&BlobRef>,
        alt: Option<&str>,
    ) -> Result<PostRef, SocialError> {
        tracing::debug!(text_len = text.len(), has_embed = embed.is_some(), "creating post");
        traced!("create_post", self.inner.create_post(text, embed, alt))
    }

    async fn like(&self, uri: &str, cid: &str) -> Result<(), SocialError> {
        traced!("like", self.inner.like(uri, cid))
    }

    async fn repost(&self, uri: &str, cid: &str) -> Result<(), SocialError> {
        traced!("repost", self.inner.repost(uri, cid))
    }

    async fn follow(&self, did: &str) -> Result<(), SocialError> {
        traced!("follow", self.inner.follow(did))
    }

    async fn reply(&self, parent: &PostRef, text: &str) -> Result<PostRef, SocialError> {
        traced!("reply", self.inner.reply(parent, text))
    }

    async fn get_timeline(&self, limit: usize) -> Result<Vec<FeedItem>, SocialError> {
        traced!("get_timeline", self.inner.get_timeline(limit))
    }

    async fn get_hot_feed(&self, limit: usize) -> Result<Vec<FeedItem>, SocialError> {
        traced!("get_hot_feed", self.inner.get_hot_feed(limit))
    }

    async fn upload_blob(&self, bytes: Vec<u8>, mime: &str) -> Result<BlobRef, SocialError> {
        tracing::debug!(size = bytes.len(), mime, "uploading blob");
        traced!("upload_blob", self.inner.upload_blob(bytes, mime))
    }

    async fn upsert_profile(&self, pinned_post: Option<&PostRef>) -> Result<(), SocialError> {
        traced!("upsert_profile", self.inner.upsert_profile(pinned_post))
    }

    async fn start_conversation(&self, handle: &str) -> Result<String, SocialError> {
        traced!("start_conversation", self.inner.start_conversation(handle))
    }

    async fn send_dm(&self, convo_id: &str, text: &str) -> Result<(), SocialError> {
        traced!("send_dm", self.inner.send_dm(convo_id, text))
    }

    async fn list_conversations(&self) -> Result<Vec<String>, SocialError> {
        traced!("list_conversations", self.inner.list_conversations())
    }
}
