//! ambiance-cache: client-side audio cache for ambiance playback.
//!
//! Keeps the audio of sounds used by ambiances in a persistent store so
//! they play without network access, while staying within the storage
//! quota the host grants.
//!
//! # Modules
//!
//! - [`types`]: Sound metadata, cached entries, ambiances and manifests
//! - [`cache`]: Object store, quota oracle and eviction engine
//! - [`fetch`]: Audio blob fetching
//! - [`sync`]: Batch synchronization of the sounds in use
//! - [`audio_cache`]: Facade with playback read-through and capture
//! - [`config`]: Runtime configuration (CacheConfig)
//! - [`error`]: Error types and codes (CacheError, ErrorCode)
//!
//! # Example
//!
//! ```rust,ignore
//! use ambiance_cache::{AudioCache, CacheConfig, Manifest};
//!
//! let cache = AudioCache::open(&CacheConfig::from_env())?;
//! let manifest = Manifest::load("rain.json".as_ref())?;
//!
//! // Download everything the open ambiance uses
//! let report = cache
//!     .sync_with_retry(&manifest.sounds, manifest.ambiance.as_ref())
//!     .await;
//! println!("{} added, {} failed", report.added.len(), report.failed.len());
//! ```

pub mod audio_cache;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod sync;
pub mod types;

// Re-export commonly used types at crate root for convenience
pub use audio_cache::{pick_variant, AudioCache, CacheStats};
pub use cache::{EvictionEngine, EvictionOutcome, QuotaOracle, SoundStore};
pub use config::{CacheConfig, QuotaSource, RetryConfig};
pub use error::{CacheError, ErrorCode, Result};
pub use fetch::{BlobSource, HttpFetcher};
pub use sync::{CacheSync, SyncReport};
pub use types::{Ambiance, AmbianceSound, CachedSound, Manifest, SoundId, SoundMetadata};
