// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP blob fetching for image URLs on post payloads

use async_trait::async_trait;
use murmur_core::adapters::{BlobFetcher, FetchError, FetchedBlob};
use std::time::Duration;

const FETCH_TIMEOUT: Duration = Duration::from_secs(20);
/// Refuse to buffer bodies beyond this; the post executor's cap is far
/// smaller, but a hostile URL should not balloon memory first.
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Blob fetcher over a pooled reqwest client
#[derive(Clone)]
pub struct HttpBlobFetcher {
    client: reqwest::Client,
}

impl HttpBlobFetcher {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(FETCH_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Failed(format!("http client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl BlobFetcher for HttpBlobFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedBlob, FetchError> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(FetchError::Unsupported(url.to_string()));
        }

        tracing::debug!(url, "fetching image");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Failed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::Failed(format!(
                "{} fetching {}",
                response.status(),
                url
            )));
        }

        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        if let Some(length) = response.content_length() {
            if length as usize > MAX_BODY_BYTES {
                return Err(FetchError::Failed(format!(
                    "body of {} bytes exceeds fetch limit",
                    length
                )));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Failed(e.to_string()))?;
        if bytes.len() > MAX_BODY_BYTES {
            return Err(FetchError::Failed(format!(
                "body of {} bytes exceeds fetch limit",
                bytes.len()
            )));
        }

        tracing::debug!(url, size = bytes.len(), mime = %mime, "image fetched");
        Ok(FetchedBlob {
            bytes: bytes.to_vec(),
            mime,
        })
    }
}
