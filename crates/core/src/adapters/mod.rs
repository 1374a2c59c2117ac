// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capability traits for external collaborators
//!
//! The core never speaks the social protocol and never owns the credential
//! database; it drives these through the traits defined here. Fakes for
//! tests live alongside the traits.

mod fake;
mod traits;

pub use fake::{FakeAccountStore, FakeBlobFetcher, FakeClientFactory, FakeScaler, FakeSocialClient};
pub use traits::{
    AccountRecord, AccountStore, AuthTokens, BlobFetcher, BlobRef, ClientFactory, FeedItem,
    FeedPost, FetchError, FetchedBlob, ImageScaler, NoScaler, PostRef, ScaleError, SocialClient,
    SocialError, StoreError, TokenUpdate,
};
