//! Error types for the audio cache.
//!
//! Defines the error codes and the error type used throughout the cache
//! for consistent error handling and reporting.

use std::fmt;
use std::time::Duration;

/// Error codes attached to every [`CacheError`].
///
/// The codes let callers decide whether a failure is worth surfacing
/// (write paths) or can be treated as a cache miss (read paths).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The persistent store could not be opened or is busy.
    /// Trigger: unwritable cache directory, database locked.
    StoreUnavailable,

    /// The store schema is missing or incomplete.
    /// Trigger: tables dropped or database replaced underneath us.
    StoreMissing,

    /// A write transaction failed.
    /// Trigger: disk full, constraint failure, I/O error mid-commit.
    StoreWriteFailed,

    /// A stored row could not be decoded.
    /// Trigger: metadata JSON written by an incompatible build.
    StoreCorrupt,

    /// Fetching an audio path failed.
    /// Trigger: network error, non-success HTTP status, bad URL.
    FetchFailed,

    /// Fetching took longer than its deadline.
    FetchTimeout,

    /// An audio body exceeded the configured maximum size.
    BlobTooLarge,

    /// Configuration was rejected.
    InvalidConfig,

    /// A manifest file could not be read or parsed.
    InvalidManifest,
}

impl ErrorCode {
    /// Returns the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::StoreUnavailable => "STORE_UNAVAILABLE",
            ErrorCode::StoreMissing => "STORE_MISSING",
            ErrorCode::StoreWriteFailed => "STORE_WRITE_FAILED",
            ErrorCode::StoreCorrupt => "STORE_CORRUPT",
            ErrorCode::FetchFailed => "FETCH_FAILED",
            ErrorCode::FetchTimeout => "FETCH_TIMEOUT",
            ErrorCode::BlobTooLarge => "BLOB_TOO_LARGE",
            ErrorCode::InvalidConfig => "INVALID_CONFIG",
            ErrorCode::InvalidManifest => "INVALID_MANIFEST",
        }
    }

    /// Returns a recovery hint suggesting how to resolve this error.
    pub fn recovery_hint(&self) -> &'static str {
        match self {
            ErrorCode::StoreUnavailable => {
                "Check that the cache directory exists and is writable, \
                 or set AMBIANCE_CACHE_PATH to another location"
            }
            ErrorCode::StoreMissing => {
                "The store will be recreated on the next call; \
                 run `ambiance-cache clear` if the problem persists"
            }
            ErrorCode::StoreWriteFailed => {
                "Check free disk space; the sound will be fetched again on next use"
            }
            ErrorCode::StoreCorrupt => "Run `ambiance-cache clear` to discard unreadable entries",
            ErrorCode::FetchFailed => {
                "Check network connectivity and AMBIANCE_CACHE_BASE_URL"
            }
            ErrorCode::FetchTimeout => {
                "Retry later or raise AMBIANCE_CACHE_FETCH_TIMEOUT_SECS"
            }
            ErrorCode::BlobTooLarge => "Raise or unset AMBIANCE_CACHE_MAX_BLOB_BYTES",
            ErrorCode::InvalidConfig => "Fix the reported setting and restart",
            ErrorCode::InvalidManifest => {
                "Provide a JSON file with a `sounds` array and an optional `ambiance` object"
            }
        }
    }

    /// Returns true for codes that should drop the shared store connection.
    pub fn invalidates_connection(&self) -> bool {
        matches!(self, ErrorCode::StoreUnavailable | ErrorCode::StoreMissing)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type for cache operations.
#[derive(Debug)]
pub struct CacheError {
    /// The error code identifying the type of error.
    pub code: ErrorCode,
    /// Human-readable error message with context.
    pub message: String,
    /// Optional underlying cause of the error.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl CacheError {
    /// Creates a new CacheError with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new CacheError with an underlying cause.
    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a STORE_UNAVAILABLE error.
    pub fn store_unavailable(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::StoreUnavailable,
            format!("Store unavailable: {}", reason.into()),
        )
    }

    /// Creates a STORE_MISSING error.
    pub fn store_missing(what: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::StoreMissing,
            format!("Store partition missing: {}", what.into()),
        )
    }

    /// Creates a STORE_WRITE_FAILED error.
    pub fn store_write_failed(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::StoreWriteFailed,
            format!("Store write failed: {}", reason.into()),
        )
    }

    /// Creates a STORE_CORRUPT error.
    pub fn store_corrupt(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::StoreCorrupt,
            format!("Stored entry unreadable: {}", reason.into()),
        )
    }

    /// Creates a FETCH_FAILED error.
    pub fn fetch_failed(path: &str, reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::FetchFailed,
            format!("Failed to fetch {}: {}", path, reason.into()),
        )
    }

    /// Creates a FETCH_TIMEOUT error.
    pub fn fetch_timeout(what: &str, timeout: Duration) -> Self {
        Self::new(
            ErrorCode::FetchTimeout,
            format!("Fetching {} timed out after {:?}", what, timeout),
        )
    }

    /// Creates a BLOB_TOO_LARGE error.
    pub fn blob_too_large(path: &str, limit: u64) -> Self {
        Self::new(
            ErrorCode::BlobTooLarge,
            format!("Audio at {} exceeds {} bytes", path, limit),
        )
    }

    /// Creates an INVALID_CONFIG error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InvalidConfig,
            format!("Invalid configuration: {}", reason.into()),
        )
    }

    /// Creates an INVALID_MANIFEST error.
    pub fn invalid_manifest(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InvalidManifest,
            format!("Invalid manifest: {}", reason.into()),
        )
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}. Recovery: {}",
            self.code,
            self.message,
            self.code.recovery_hint()
        )
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Result type alias using CacheError.
pub type Result<T> = std::result::Result<T, CacheError>;
