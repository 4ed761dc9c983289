//! Audio blob fetching.
//!
//! [`BlobSource`] is the seam between the cache and the network. The batch
//! helpers here fetch several paths at once and tolerate partial failure.

pub mod http;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use tracing::warn;

use crate::error::Result;

// Re-export commonly used types
pub use http::HttpFetcher;

/// Source of raw audio bytes for a remote audio path.
#[async_trait]
pub trait BlobSource: Send + Sync {
    /// Fetches the full body behind `path`.
    async fn fetch(&self, path: &str) -> Result<Bytes>;
}

/// Fetches every path, skipping failures.
///
/// Failed paths are logged and left out, so the result can be shorter than
/// `paths` and blob `i` is not guaranteed to belong to `paths[i]`. Use
/// [`fetch_indexed`] when the correspondence matters.
pub async fn fetch_all(source: &dyn BlobSource, paths: &[String]) -> Vec<Bytes> {
    fetch_indexed(source, paths)
        .await
        .into_iter()
        .map(|(_, blob)| blob)
        .collect()
}

/// Fetches every path, returning each success with its index in `paths`.
pub async fn fetch_indexed(source: &dyn BlobSource, paths: &[String]) -> Vec<(usize, Bytes)> {
    let results = join_all(paths.iter().map(|path| source.fetch(path))).await;

    results
        .into_iter()
        .enumerate()
        .filter_map(|(index, result)| match result {
            Ok(blob) => Some((index, blob)),
            Err(e) => {
                warn!(path = %paths[index], error = %e.message, "skipping audio path");
                None
            }
        })
        .collect()
}
