//! HTTP audio downloader.
//!
//! Downloads audio bodies with streaming so that an oversized file is
//! abandoned as soon as it crosses the configured limit.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::{Client, Url};
use tracing::debug;

use super::BlobSource;
use crate::error::{CacheError, ErrorCode, Result};

/// Fetches audio paths over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    base_url: Option<Url>,
    max_blob_bytes: Option<u64>,
}

impl HttpFetcher {
    /// Creates a fetcher with a per-request timeout.
    pub fn new(base_url: Option<&str>, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(request_timeout).build().map_err(|e| {
            CacheError::with_source(ErrorCode::InvalidConfig, "failed to create HTTP client", e)
        })?;

        let base_url = base_url
            .map(|url| {
                Url::parse(url).map_err(|e| {
                    CacheError::invalid_config(format!("invalid base URL {}: {}", url, e))
                })
            })
            .transpose()?;

        Ok(Self {
            client,
            base_url,
            max_blob_bytes: None,
        })
    }

    /// Rejects bodies larger than `limit` bytes.
    pub fn with_max_blob_bytes(mut self, limit: Option<u64>) -> Self {
        self.max_blob_bytes = limit;
        self
    }

    /// Resolves an audio path against the base URL.
    ///
    /// Absolute URLs are used as-is.
    pub fn resolve(&self, path: &str) -> Result<Url> {
        if let Ok(url) = Url::parse(path) {
            return Ok(url);
        }

        match self.base_url {
            Some(ref base) => base
                .join(path.trim_start_matches('/'))
                .map_err(|e| CacheError::fetch_failed(path, e.to_string())),
            None => Err(CacheError::fetch_failed(
                path,
                "relative path without a base URL",
            )),
        }
    }
}

#[async_trait]
impl BlobSource for HttpFetcher {
    async fn fetch(&self, path: &str) -> Result<Bytes> {
        let url = self.resolve(path)?;

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| request_error(e, path, &url))?;

        if !response.status().is_success() {
            return Err(CacheError::fetch_failed(
                path,
                format!("HTTP {}", response.status()),
            ));
        }

        if let (Some(limit), Some(length)) = (self.max_blob_bytes, response.content_length()) {
            if length > limit {
                return Err(CacheError::blob_too_large(path, limit));
            }
        }

        // Content-Length is only a hint; never reserve more than the cap.
        let capacity = response
            .content_length()
            .unwrap_or(0)
            .min(INITIAL_CAPACITY_CAP);
        let mut body = BytesMut::with_capacity(capacity as usize);

        // Stream the body in chunks
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| request_error(e, path, &url))?;
            body.extend_from_slice(&chunk);

            if let Some(limit) = self.max_blob_bytes {
                if body.len() as u64 > limit {
                    return Err(CacheError::blob_too_large(path, limit));
                }
            }
        }

        debug!(path, bytes = body.len(), "fetched audio");
        Ok(body.freeze())
    }
}

/// Largest buffer reserved up front for a body (1 MiB).
const INITIAL_CAPACITY_CAP: u64 = 1 << 20;

fn request_error(e: reqwest::Error, path: &str, url: &Url) -> CacheError {
    if e.is_timeout() {
        CacheError::with_source(ErrorCode::FetchTimeout, format!("request to {} timed out", url), e)
    } else {
        CacheError::fetch_failed(path, e.to_string())
    }
}
