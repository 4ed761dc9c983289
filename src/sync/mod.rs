//! Sync module reconciling the sounds in use with the cache.

pub mod orchestrator;

// Re-export commonly used types
pub use orchestrator::{CacheSync, SyncReport};
