//! Cache module for sound storage.
//!
//! Provides the object store, the quota oracle and the eviction engine
//! that together keep captured audio within the host's storage budget.

pub mod eviction;
pub mod memory;
pub mod quota;
pub mod sqlite;
pub mod store;

// Re-export commonly used types
pub use eviction::{EvictionEngine, EvictionOutcome};
pub use memory::MemoryStore;
pub use quota::{
    DiskEstimator, FixedEstimator, QuotaOracle, QuotaSnapshot, StorageEstimate, StorageEstimator,
    FALLBACK_QUOTA_BYTES,
};
pub use sqlite::SqliteStore;
pub use store::SoundStore;
