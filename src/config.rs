//! Cache configuration module.
//!
//! Contains the runtime configuration for the audio cache, including
//! the storage location, quota source, fetch timeouts and retry policy.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Where the quota oracle gets its capacity figure from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QuotaSource {
    /// Free space on the disk holding the cache directory.
    #[default]
    Disk,

    /// A fixed capacity taken from `quota_bytes`.
    Fixed,

    /// No estimate; the oracle uses its fallback ceiling.
    None,
}

impl QuotaSource {
    /// Returns the string representation of the quota source.
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaSource::Disk => "disk",
            QuotaSource::Fixed => "fixed",
            QuotaSource::None => "none",
        }
    }

    /// Parses a quota source from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "disk" => Some(QuotaSource::Disk),
            "fixed" => Some(QuotaSource::Fixed),
            "none" | "fallback" => Some(QuotaSource::None),
            _ => None,
        }
    }
}

impl std::fmt::Display for QuotaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Retry policy for batch synchronization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total number of sync attempts, including the first.
    pub attempts: u32,

    /// Delay before the second attempt; doubled for each further attempt.
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

impl RetryConfig {
    /// Delay before the first retry.
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

/// Runtime configuration for the cache.
///
/// This configuration is typically loaded from environment variables at
/// startup and then overridden by command-line flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding the cache database.
    /// If None, uses the platform-specific default cache location.
    pub cache_path: Option<PathBuf>,

    /// Base URL that relative audio paths are resolved against.
    pub base_url: Option<String>,

    /// Deadline for fetching all variants of one sound during sync.
    pub fetch_timeout_secs: u64,

    /// Deadline for a single HTTP request.
    pub request_timeout_secs: u64,

    /// Largest accepted audio body. None means unlimited.
    pub max_blob_bytes: Option<u64>,

    /// Capacity reported by the fixed quota source.
    pub quota_bytes: Option<u64>,

    /// Source of the storage quota.
    pub quota_source: QuotaSource,

    /// Keep entries in process memory instead of on disk.
    pub in_memory: bool,

    /// Retry policy for batch sync.
    pub retry: RetryConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_path: None,
            base_url: None,
            fetch_timeout_secs: 30,
            request_timeout_secs: 20,
            max_blob_bytes: None,
            quota_bytes: None,
            quota_source: QuotaSource::Disk,
            in_memory: false,
            retry: RetryConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Creates a new CacheConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a CacheConfig from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `AMBIANCE_CACHE_PATH` - Cache directory
    /// - `AMBIANCE_CACHE_BASE_URL` - Base URL for relative audio paths
    /// - `AMBIANCE_CACHE_FETCH_TIMEOUT_SECS` - Per-sound fetch deadline
    /// - `AMBIANCE_CACHE_REQUEST_TIMEOUT_SECS` - Per-request deadline
    /// - `AMBIANCE_CACHE_MAX_BLOB_BYTES` - Largest accepted audio body
    /// - `AMBIANCE_CACHE_QUOTA_BYTES` - Capacity for the fixed quota source
    /// - `AMBIANCE_CACHE_QUOTA_SOURCE` - Quota source (disk, fixed, none)
    /// - `AMBIANCE_CACHE_IN_MEMORY` - Non-persistent store (1/true)
    /// - `AMBIANCE_CACHE_RETRY_ATTEMPTS` - Sync attempts
    /// - `AMBIANCE_CACHE_RETRY_DELAY_MS` - First retry delay
    ///
    /// Falls back to defaults for unset or unparsable variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates a CacheConfig from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("AMBIANCE_CACHE_PATH") {
            config.cache_path = Some(PathBuf::from(path));
        }

        if let Some(url) = lookup("AMBIANCE_CACHE_BASE_URL") {
            if !url.trim().is_empty() {
                config.base_url = Some(url.trim().to_string());
            }
        }

        if let Some(secs) = lookup("AMBIANCE_CACHE_FETCH_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            config.fetch_timeout_secs = secs;
        }

        if let Some(secs) = lookup("AMBIANCE_CACHE_REQUEST_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            config.request_timeout_secs = secs;
        }

        if let Some(bytes) = lookup("AMBIANCE_CACHE_MAX_BLOB_BYTES").and_then(|s| s.parse().ok()) {
            config.max_blob_bytes = Some(bytes);
        }

        if let Some(bytes) = lookup("AMBIANCE_CACHE_QUOTA_BYTES").and_then(|s| s.parse().ok()) {
            config.quota_bytes = Some(bytes);
        }

        if let Some(source) = lookup("AMBIANCE_CACHE_QUOTA_SOURCE").and_then(|s| QuotaSource::parse(&s)) {
            config.quota_source = source;
        }

        if let Some(flag) = lookup("AMBIANCE_CACHE_IN_MEMORY") {
            config.in_memory = matches!(flag.to_lowercase().as_str(), "1" | "true" | "yes");
        }

        if let Some(attempts) = lookup("AMBIANCE_CACHE_RETRY_ATTEMPTS").and_then(|s| s.parse().ok()) {
            config.retry.attempts = attempts;
        }

        if let Some(delay) = lookup("AMBIANCE_CACHE_RETRY_DELAY_MS").and_then(|s| s.parse().ok()) {
            config.retry.base_delay_ms = delay;
        }

        config
    }

    /// Returns the effective cache path, using platform defaults if not specified.
    pub fn effective_cache_path(&self) -> PathBuf {
        if let Some(ref path) = self.cache_path {
            path.clone()
        } else {
            default_cache_path()
        }
    }

    /// Per-sound fetch deadline.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Per-request deadline.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validates the configuration.
    ///
    /// Returns an error message if validation fails, None otherwise.
    pub fn validate(&self) -> Option<String> {
        if self.fetch_timeout_secs == 0 {
            return Some("fetch timeout must be > 0".to_string());
        }

        if self.request_timeout_secs == 0 {
            return Some("request timeout must be > 0".to_string());
        }

        if !(1..=10).contains(&self.retry.attempts) {
            return Some(format!(
                "retry attempts out of range: {} (1-10)",
                self.retry.attempts
            ));
        }

        if self.quota_source == QuotaSource::Fixed && self.quota_bytes.is_none() {
            return Some("fixed quota source requires AMBIANCE_CACHE_QUOTA_BYTES".to_string());
        }

        if let Some(ref url) = self.base_url {
            if let Err(e) = reqwest::Url::parse(url) {
                return Some(format!("invalid base URL {}: {}", url, e));
            }
        }

        None
    }
}

/// Returns the platform-specific default cache storage path.
///
/// Uses the `directories` crate to find appropriate locations:
/// - macOS: ~/Library/Caches/ambiance/audio
/// - Linux: ~/.cache/ambiance/audio
/// - Windows: C:\Users\<user>\AppData\Local\ambiance\cache\audio
fn default_cache_path() -> PathBuf {
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "ambiance") {
        proj_dirs.cache_dir().join("audio")
    } else {
        // Fallback to current directory
        PathBuf::from("./ambiance-cache")
    }
}
