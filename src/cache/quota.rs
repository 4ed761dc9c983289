//! Storage quota oracle.
//!
//! Asks the host how much space the cache may use and derives the ceiling
//! the eviction engine works against. The host is re-queried on every call
//! because other writers change the answer.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use sysinfo::Disks;
use tracing::debug;

/// Ceiling used when the host cannot report capacity (50 MiB).
pub const FALLBACK_QUOTA_BYTES: u64 = 50 * 1024 * 1024;

/// Capacity and usage as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageEstimate {
    /// Bytes the cache could occupy in total.
    pub quota: u64,
    /// Bytes currently occupied.
    pub usage: u64,
}

/// Quota figures for one eviction decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaSnapshot {
    pub quota: u64,
    pub usage: u64,
    /// 80% of `quota`, or the fallback ceiling.
    pub allowed_bytes: u64,
}

impl QuotaSnapshot {
    /// Derives the allowed ceiling from a host estimate.
    pub fn from_estimate(estimate: StorageEstimate) -> Self {
        Self {
            quota: estimate.quota,
            usage: estimate.usage,
            allowed_bytes: (estimate.quota as u128 * 4 / 5) as u64,
        }
    }

    /// Snapshot used when no estimate is available.
    pub fn fallback() -> Self {
        Self {
            quota: FALLBACK_QUOTA_BYTES,
            usage: 0,
            allowed_bytes: FALLBACK_QUOTA_BYTES,
        }
    }
}

/// Host capability that reports storage capacity.
#[async_trait]
pub trait StorageEstimator: Send + Sync {
    /// Returns the current estimate, or None if the host cannot tell.
    async fn estimate(&self) -> Option<StorageEstimate>;
}

/// Produces [`QuotaSnapshot`]s, falling back to a fixed ceiling.
#[derive(Clone, Default)]
pub struct QuotaOracle {
    estimator: Option<Arc<dyn StorageEstimator>>,
}

impl QuotaOracle {
    /// Creates an oracle backed by `estimator`.
    pub fn new(estimator: Arc<dyn StorageEstimator>) -> Self {
        Self {
            estimator: Some(estimator),
        }
    }

    /// Creates an oracle that always reports the fallback ceiling.
    pub fn fallback() -> Self {
        Self { estimator: None }
    }

    /// Queries the host. Never fails.
    pub async fn snapshot(&self) -> QuotaSnapshot {
        let estimate = match self.estimator {
            Some(ref estimator) => estimator.estimate().await,
            None => None,
        };

        let snapshot = estimate
            .map(QuotaSnapshot::from_estimate)
            .unwrap_or_else(QuotaSnapshot::fallback);
        debug!(
            quota = snapshot.quota,
            usage = snapshot.usage,
            allowed = snapshot.allowed_bytes,
            "quota snapshot"
        );
        snapshot
    }
}

/// Estimates quota from the free space of the disk holding the cache.
///
/// The quota is what the cache could grow to: free space plus what it
/// already occupies.
pub struct DiskEstimator {
    dir: PathBuf,
}

impl DiskEstimator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl StorageEstimator for DiskEstimator {
    async fn estimate(&self) -> Option<StorageEstimate> {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || {
            let usage = directory_usage(&dir);
            let available = available_space(&dir)?;
            Some(StorageEstimate {
                quota: available.saturating_add(usage),
                usage,
            })
        })
        .await
        .ok()
        .flatten()
    }
}

/// Reports a configured capacity and the cache directory's usage.
pub struct FixedEstimator {
    quota: u64,
    dir: Option<PathBuf>,
}

impl FixedEstimator {
    pub fn new(quota: u64, dir: Option<PathBuf>) -> Self {
        Self { quota, dir }
    }
}

#[async_trait]
impl StorageEstimator for FixedEstimator {
    async fn estimate(&self) -> Option<StorageEstimate> {
        let usage = match self.dir.clone() {
            Some(dir) => tokio::task::spawn_blocking(move || directory_usage(&dir))
                .await
                .unwrap_or(0),
            None => 0,
        };
        Some(StorageEstimate {
            quota: self.quota,
            usage,
        })
    }
}

/// Total size of the files below `dir`. Missing directories count as empty.
pub fn directory_usage(dir: &Path) -> u64 {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };

    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| match entry.metadata() {
            Ok(meta) if meta.is_dir() => directory_usage(&entry.path()),
            Ok(meta) => meta.len(),
            Err(_) => 0,
        })
        .sum()
}

/// Free space on the disk whose mount point is the closest ancestor of `dir`.
fn available_space(dir: &Path) -> Option<u64> {
    // The cache directory may not exist yet; use its nearest existing ancestor.
    let existing = dir.ancestors().find(|p| p.exists())?;
    let target = existing.canonicalize().ok()?;

    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|disk| target.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| disk.available_space())
}
