// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mass-post executor: sequentially publish a batch of posts
//!
//! Items may carry an image (a `data:` URI or an `http(s)` URL) and at most
//! one item per batch may pin the created post to the profile. Oversized
//! images are downscaled through the image-scaler capability; when no
//! scaler is available the item fails with `BlobTooLarge` rather than
//! uploading truncated bytes.

use super::paced_sleep;
use crate::adapters::{
    AccountStore, BlobFetcher, FetchedBlob, ImageScaler, ScaleError, SocialClient,
};
use crate::auth::AuthCoordinator;
use crate::error::JobError;
use crate::logsink::JobLogger;
use crate::random::Rand;
use crate::session::{AccountMetadata, SessionData};
use base64::Engine;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Upload safety cap
pub const BLOB_CAP_BYTES: usize = 900 * 1024;
/// Downscale target width
pub const MAX_IMAGE_WIDTH: u32 = 1280;
/// Downscale re-encode quality
pub const JPEG_QUALITY: u8 = 80;
/// Inter-post pause bounds, seconds
pub const DEFAULT_POST_DELAY_RANGE: [u64; 2] = [5, 30];

/// One post in a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostItem {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub pin: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    #[serde(default)]
    pub include_timestamp: bool,
}

/// The massPost payload body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostBatchOptions {
    pub posts: Vec<PostItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_range: Option<[u64; 2]>,
    #[serde(default)]
    pub reverse_order: bool,
}

/// One row of the mass-post report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostStats {
    pub published: usize,
    pub failed: usize,
    pub pinned_post: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostReport {
    pub results: Vec<PostOutcome>,
    pub stats: PostStats,
}

/// Sequential batch publisher
pub struct PostExecutor<'a, C, S, F, Sc, R> {
    pub client: &'a C,
    pub coordinator: &'a AuthCoordinator<S>,
    pub fetcher: &'a F,
    pub scaler: &'a Sc,
    pub rand: &'a R,
}

impl<'a, C, S, F, Sc, R> PostExecutor<'a, C, S, F, Sc, R>
where
    C: SocialClient,
    S: AccountStore,
    F: BlobFetcher,
    Sc: ImageScaler,
    R: Rand,
{
    pub async fn run(
        &self,
        session: &mut SessionData,
        metadata: &AccountMetadata,
        batch: &PostBatchOptions,
        log: &JobLogger,
        cancel: &CancellationToken,
        mut on_step: impl FnMut(usize),
    ) -> Result<PostReport, JobError> {
        let mut items: Vec<&PostItem> = batch.posts.iter().collect();
        if batch.reverse_order {
            // Oldest first
            items.reverse();
        }
        let [dmin, dmax] = batch.delay_range.unwrap_or(DEFAULT_POST_DELAY_RANGE);

        let mut results = Vec::with_capacity(items.len());
        let mut pinned_done = false;
        let last = items.len().saturating_sub(1);

        for (i, item) in items.iter().enumerate() {
            let outcome = self
                .publish_one(session, metadata, item, &mut pinned_done, log)
                .await;
            results.push(outcome);
            on_step(i);

            if i < last {
                paced_sleep(self.rand.pick(dmin, dmax), cancel).await?;
            }
        }

        let published = results.iter().filter(|r| r.success).count();
        Ok(PostReport {
            stats: PostStats {
                published,
                failed: results.len() - published,
                pinned_post: results.iter().any(|r| r.pinned),
            },
            results,
        })
    }

    async fn publish_one(
        &self,
        session: &mut SessionData,
        metadata: &AccountMetadata,
        item: &PostItem,
        pinned_done: &mut bool,
        log: &JobLogger,
    ) -> PostOutcome {
        // The session may have lapsed mid-batch; coordinate again
        if !self.client.has_session().await {
            log.warn("session lapsed, re-running auth coordination");
            if let Err(e) = self
                .coordinator
                .establish(self.client, session, metadata, log)
                .await
            {
                log.error(format!("re-authentication failed: {}", e));
                return failure(e.to_string());
            }
        }

        let mut text = item.text.clone();
        if item.include_timestamp {
            text.push_str(&format!(
                "\n\n[{}]",
                Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
            ));
        }

        let created = match item.image_url.as_deref() {
            Some(url) => match self.resolve_image(url, log).await {
                Ok(blob) => {
                    match self.client.upload_blob(blob.bytes, &blob.mime).await {
                        Ok(blob_ref) => {
                            self.client
                                .create_post(&text, Some(&blob_ref), item.alt.as_deref())
                                .await
                                .map_err(JobError::from)
                        }
                        Err(e) => Err(e.into()),
                    }
                }
                Err(e) => Err(e),
            },
            None => self
                .client
                .create_post(&text, None, None)
                .await
                .map_err(JobError::from),
        };

        let post = match created {
            Ok(post) => post,
            Err(e) => {
                log.error(format!("post failed: {}", e));
                return failure(e.to_string());
            }
        };

        let mut pinned = false;
        if item.pin && !*pinned_done {
            match self.client.upsert_profile(Some(&post)).await {
                Ok(()) => {
                    log.info(format!("pinned post {}", post.uri));
                    *pinned_done = true;
                    pinned = true;
                }
                Err(e) => {
                    // The post itself stands; only the pin failed
                    log.warn(format!("pin failed for {}: {}", post.uri, e));
                }
            }
        }

        PostOutcome {
            success: true,
            uri: Some(post.uri),
            cid: Some(post.cid),
            pinned,
            error: None,
        }
    }

    /// Resolve an image URL to bytes fitting the upload cap
    async fn resolve_image(&self, url: &str, log: &JobLogger) -> Result<FetchedBlob, JobError> {
        let blob = if url.starts_with("data:") {
            decode_data_uri(url)?
        } else if url.starts_with("http://") || url.starts_with("https://") {
            self.fetcher
                .fetch(url)
                .await
                .map_err(|e| JobError::Upstream(e.to_string()))?
        } else {
            return Err(JobError::BadRequest(format!(
                "unsupported image url: {}",
                url
            )));
        };

        if blob.bytes.len() <= BLOB_CAP_BYTES {
            return Ok(blob);
        }

        log.warn(format!(
            "image is {} KiB, above the {} KiB cap; downscaling",
            blob.bytes.len() / 1024,
            BLOB_CAP_BYTES / 1024
        ));
        match self
            .scaler
            .downscale(&blob.bytes, MAX_IMAGE_WIDTH, JPEG_QUALITY)
        {
            Ok(scaled) if scaled.len() <= BLOB_CAP_BYTES => Ok(FetchedBlob {
                bytes: scaled,
                mime: "image/jpeg".to_string(),
            }),
            Ok(scaled) => Err(JobError::BlobTooLarge {
                size: scaled.len(),
                cap: BLOB_CAP_BYTES,
            }),
            Err(ScaleError::Unavailable) => {
                log.error("no image pipeline available; refusing oversized upload");
                Err(JobError::BlobTooLarge {
                    size: blob.bytes.len(),
                    cap: BLOB_CAP_BYTES,
                })
            }
            Err(ScaleError::Failed(e)) => {
                log.error(format!("downscale failed: {}", e));
                Err(JobError::BlobTooLarge {
                    size: blob.bytes.len(),
                    cap: BLOB_CAP_BYTES,
                })
            }
        }
    }
}

fn failure(error: String) -> PostOutcome {
    PostOutcome {
        success: false,
        uri: None,
        cid: None,
        pinned: false,
        error: Some(error),
    }
}

/// Decode a `data:<mime>;base64,<payload>` URI
fn decode_data_uri(url: &str) -> Result<FetchedBlob, JobError> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| JobError::BadRequest("not a data uri".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| JobError::BadRequest("malformed data uri".to_string()))?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| JobError::BadRequest("data uri is not base64".to_string()))?;

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| JobError::BadRequest(format!("invalid base64 payload: {}", e)))?;

    Ok(FetchedBlob {
        bytes,
        mime: if mime.is_empty() {
            "application/octet-stream".to_string()
        } else {
            mime.to_string()
        },
    })
}

#[cfg(test)]
#[path = "post_tests.rs"]
mod tests;
