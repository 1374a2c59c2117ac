// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory fakes for tests and for running the daemon without an
//! upstream binding

use super::traits::{
    AccountRecord, AccountStore, AuthTokens, BlobFetcher, BlobRef, ClientFactory, FeedItem,
    FetchError, FetchedBlob, ImageScaler, PostRef, ScaleError, SocialClient, SocialError,
    StoreError, TokenUpdate,
};
use crate::session::{AccountMetadata, SessionData};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A post recorded by the fake client
#[derive(Debug, Clone)]
pub struct RecordedPost {
    pub text: String,
    pub embed: Option<BlobRef>,
    pub alt: Option<String>,
    pub post: PostRef,
}

#[derive(Default)]
struct FakeSocialState {
    refresh_outcome: Option<Result<AuthTokens, String>>,
    resume_error: Option<String>,
    login_outcome: Option<Result<AuthTokens, String>>,
    has_session: bool,
    engagement_error: Option<String>,
    upload_error: Option<String>,
    /// Reject conversations with this handle only
    dm_reject: Option<(String, String)>,
    timeline: Vec<FeedItem>,
    hot_feed: Vec<FeedItem>,
    timeline_requests: Vec<usize>,
    likes: Vec<(String, String)>,
    reposts: Vec<(String, String)>,
    follows: Vec<String>,
    posts: Vec<RecordedPost>,
    uploads: Vec<usize>,
    pins: Vec<Option<PostRef>>,
    conversations: Vec<String>,
    dms: Vec<(String, String)>,
    counter: u64,
}

/// Scriptable fake social client with shared recorded state
#[derive(Clone, Default)]
pub struct FakeSocialClient {
    state: Arc<Mutex<FakeSocialState>>,
}

impl FakeSocialClient {
    pub fn new() -> Self {
        let fake = Self::default();
        fake.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .has_session = true;
        fake
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeSocialState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // --- scripting ---

    pub fn with_refresh_ok(self, tokens: AuthTokens) -> Self {
        self.lock().refresh_outcome = Some(Ok(tokens));
        self
    }

    pub fn with_refresh_err(self, message: &str) -> Self {
        self.lock().refresh_outcome = Some(Err(message.to_string()));
        self
    }

    pub fn with_resume_err(self, message: &str) -> Self {
        self.lock().resume_error = Some(message.to_string());
        self
    }

    pub fn with_login_ok(self, tokens: AuthTokens) -> Self {
        self.lock().login_outcome = Some(Ok(tokens));
        self
    }

    pub fn with_login_err(self, message: &str) -> Self {
        self.lock().login_outcome = Some(Err(message.to_string()));
        self
    }

    pub fn with_session(self, has: bool) -> Self {
        self.lock().has_session = has;
        self
    }

    pub fn with_timeline(self, items: Vec<FeedItem>) -> Self {
        self.lock().timeline = items;
        self
    }

    pub fn with_hot_feed(self, items: Vec<FeedItem>) -> Self {
        self.lock().hot_feed = items;
        self
    }

    pub fn with_engagement_err(self, message: &str) -> Self {
        self.lock().engagement_error = Some(message.to_string());
        self
    }

    pub fn with_upload_err(self, message: &str) -> Self {
        self.lock().upload_error = Some(message.to_string());
        self
    }

    /// Fail conversations with one specific handle
    pub fn with_dm_reject(self, handle: &str, message: &str) -> Self {
        self.lock().dm_reject = Some((handle.to_string(), message.to_string()));
        self
    }

    /// Flip the session state mid-test
    pub fn set_session(&self, has: bool) {
        self.lock().has_session = has;
    }

    // --- recordings ---

    pub fn likes(&self) -> Vec<(String, String)> {
        self.lock().likes.clone()
    }

    pub fn reposts(&self) -> Vec<(String, String)> {
        self.lock().reposts.clone()
    }

    pub fn posts(&self) -> Vec<RecordedPost> {
        self.lock().posts.clone()
    }

    pub fn uploads(&self) -> Vec<usize> {
        self.lock().uploads.clone()
    }

    pub fn pins(&self) -> Vec<Option<PostRef>> {
        self.lock().pins.clone()
    }

    pub fn dms(&self) -> Vec<(String, String)> {
        self.lock().dms.clone()
    }

    pub fn conversations(&self) -> Vec<String> {
        self.lock().conversations.clone()
    }

    pub fn timeline_requests(&self) -> Vec<usize> {
        self.lock().timeline_requests.clone()
    }
}

#[async_trait]
impl SocialClient for FakeSocialClient {
    async fn refresh_session(&self, _refresh_token: &str) -> Result<AuthTokens, SocialError> {
        match self.lock().refresh_outcome.clone() {
            Some(Ok(tokens)) => Ok(tokens),
            Some(Err(msg)) => Err(SocialError::Auth(msg)),
            None => Err(SocialError::Auth("refresh not available".into())),
        }
    }

    async fn resume_session(&self, _session: &SessionData) -> Result<(), SocialError> {
        match self.lock().resume_error.clone() {
            Some(msg) => Err(SocialError::Auth(msg)),
            None => Ok(()),
        }
    }

    async fn login(&self, _identifier: &str, _password: &str) -> Result<AuthTokens, SocialError> {
        match self.lock().login_outcome.clone() {
            Some(Ok(tokens)) => Ok(tokens),
            Some(Err(msg)) => Err(SocialError::Auth(msg)),
            None => Err(SocialError::Auth("login not available".into())),
        }
    }

    async fn has_session(&self) -> bool {
        self.lock().has_session
    }

    async fn create_post(
        &self,
        text: &str,
        embed: Option<&BlobRef>,
        alt: Option<&str>,
    ) -> Result<PostRef, SocialError> {
        let mut state = self.lock();
        state.counter += 1;
        let post = PostRef {
            uri: format!("at://did:plc:fake/app.bsky.feed.post/{}", state.counter),
            cid: format!("cid-{}", state.counter),
        };
        state.posts.push(RecordedPost {
            text: text.to_string(),
            embed: embed.cloned(),
            alt: alt.map(str::to_string),
            post: post.clone(),
        });
        Ok(post)
    }

    async fn like(&self, uri: &str, cid: &str) -> Result<(), SocialError> {
        let mut state = self.lock();
        if let Some(msg) = state.engagement_error.clone() {
            return Err(SocialError::Upstream(msg));
        }
        state.likes.push((uri.to_string(), cid.to_string()));
        Ok(())
    }

    async fn repost(&self, uri: &str, cid: &str) -> Result<(), SocialError> {
        let mut state = self.lock();
        if let Some(msg) = state.engagement_error.clone() {
            return Err(SocialError::Upstream(msg));
        }
        state.reposts.push((uri.to_string(), cid.to_string()));
        Ok(())
    }

    async fn follow(&self, did: &str) -> Result<(), SocialError> {
        self.lock().follows.push(did.to_string());
        Ok(())
    }

    async fn reply(&self, parent: &PostRef, text: &str) -> Result<PostRef, SocialError> {
        let _ = parent;
        self.create_post(text, None, None).await
    }

    async fn get_timeline(&self, limit: usize) -> Result<Vec<FeedItem>, SocialError> {
        let mut state = self.lock();
        state.timeline_requests.push(limit);
        Ok(state.timeline.iter().take(limit).cloned().collect())
    }

    async fn get_hot_feed(&self, limit: usize) -> Result<Vec<FeedItem>, SocialError> {
        let state = self.lock();
        Ok(state.hot_feed.iter().take(limit).cloned().collect())
    }

    async fn upload_blob(&self, bytes: Vec<u8>, mime: &str) -> Result<BlobRef, SocialError> {
        let mut state = self.lock();
        if let Some(msg) = state.upload_error.clone() {
            return Err(SocialError::Upstream(msg));
        }
        state.counter += 1;
        state.uploads.push(bytes.len());
        Ok(BlobRef {
            cid: format!("blob-{}", state.counter),
            mime: mime.to_string(),
            size: bytes.len(),
        })
    }

    async fn upsert_profile(&self, pinned_post: Option<&PostRef>) -> Result<(), SocialError> {
        self.lock().pins.push(pinned_post.cloned());
        Ok(())
    }

    async fn start_conversation(&self, handle: &str) -> Result<String, SocialError> {
        let mut state = self.lock();
        if let Some(msg) = state.engagement_error.clone() {
            return Err(SocialError::Upstream(msg));
        }
        if let Some((rejected, msg)) = state.dm_reject.clone() {
            if rejected == handle {
                return Err(SocialError::Upstream(msg));
            }
        }
        state.conversations.push(handle.to_string());
        Ok(format!("convo-{}", handle))
    }

    async fn send_dm(&self, convo_id: &str, text: &str) -> Result<(), SocialError> {
        let mut state = self.lock();
        if let Some(msg) = state.engagement_error.clone() {
            return Err(SocialError::Upstream(msg));
        }
        state.dms.push((convo_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn list_conversations(&self) -> Result<Vec<String>, SocialError> {
        Ok(self
            .lock()
            .conversations
            .iter()
            .map(|h| format!("convo-{}", h))
            .collect())
    }
}

/// Factory that hands out clones of one shared fake client
#[derive(Clone, Default)]
pub struct FakeClientFactory {
    client: FakeSocialClient,
    created_for: Arc<Mutex<Vec<AccountMetadata>>>,
}

impl FakeClientFactory {
    pub fn new(client: FakeSocialClient) -> Self {
        Self {
            client,
            created_for: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn client(&self) -> &FakeSocialClient {
        &self.client
    }

    pub fn created_for(&self) -> Vec<AccountMetadata> {
        self.created_for
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl ClientFactory for FakeClientFactory {
    type Client = FakeSocialClient;

    fn create(&self, metadata: &AccountMetadata) -> FakeSocialClient {
        self.created_for
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(metadata.clone());
        self.client.clone()
    }
}

#[derive(Default)]
struct FakeStoreState {
    categories: HashMap<String, Vec<AccountRecord>>,
    updates: Vec<(String, TokenUpdate)>,
}

/// In-memory account store
#[derive(Clone, Default)]
pub struct FakeAccountStore {
    state: Arc<Mutex<FakeStoreState>>,
}

impl FakeAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category(self, category_id: &str, accounts: Vec<AccountRecord>) -> Self {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .categories
            .insert(category_id.to_string(), accounts);
        self
    }

    /// All `update_tokens` calls in order
    pub fn token_updates(&self) -> Vec<(String, TokenUpdate)> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .updates
            .clone()
    }
}

#[async_trait]
impl AccountStore for FakeAccountStore {
    async fn list_by_category(
        &self,
        category_id: &str,
    ) -> Result<Vec<AccountRecord>, StoreError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .categories
            .get(category_id)
            .cloned()
            .ok_or_else(|| StoreError::CategoryNotFound(category_id.to_string()))
    }

    async fn update_tokens(
        &self,
        account_id: &str,
        update: TokenUpdate,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.updates.push((account_id.to_string(), update));
        Ok(())
    }
}

/// Blob fetcher backed by a url -> bytes map
#[derive(Clone, Default)]
pub struct FakeBlobFetcher {
    blobs: Arc<Mutex<HashMap<String, FetchedBlob>>>,
}

impl FakeBlobFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(self, url: &str, bytes: Vec<u8>, mime: &str) -> Self {
        self.blobs.lock().unwrap_or_else(|e| e.into_inner()).insert(
            url.to_string(),
            FetchedBlob {
                bytes,
                mime: mime.to_string(),
            },
        );
        self
    }
}

#[async_trait]
impl BlobFetcher for FakeBlobFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedBlob, FetchError> {
        let blobs = self.blobs.lock().unwrap_or_else(|e| e.into_inner());
        blobs
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Failed(format!("no blob at {}", url)))
    }
}

/// Scaler that always returns a fixed payload
#[derive(Clone)]
pub struct FakeScaler {
    pub output: Vec<u8>,
}

impl FakeScaler {
    pub fn new(output: Vec<u8>) -> Self {
        Self { output }
    }
}

impl ImageScaler for FakeScaler {
    fn downscale(&self, _bytes: &[u8], _max_width: u32, _quality: u8) -> Result<Vec<u8>, ScaleError> {
        Ok(self.output.clone())
    }
}
