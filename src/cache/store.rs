//! Object store interface for cached sounds.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{CachedSound, SoundId};

/// Persistent key-value store of [`CachedSound`] entries keyed by sound id.
///
/// Every call is atomic on its own. Reads never fail: an unreachable
/// store looks like an empty one. Writes report failures because the
/// eviction engine's accounting depends on them.
#[async_trait]
pub trait SoundStore: Send + Sync {
    /// Returns every stored entry, or an empty list if the store is unreachable.
    async fn get_all(&self) -> Vec<CachedSound>;

    /// Returns the entry for `id`, or None if absent or unreachable.
    async fn get_by_id(&self, id: SoundId) -> Option<CachedSound>;

    /// Inserts or fully replaces the entry with the same id.
    async fn put(&self, sound: &CachedSound) -> Result<()>;

    /// Removes the entry for `id`. Absent ids are not an error.
    async fn delete_by_id(&self, id: SoundId) -> Result<()>;

    /// Removes every entry.
    async fn clear(&self) -> Result<()>;
}

/// Sum of stored blob bytes across `sounds`.
pub fn total_bytes(sounds: &[CachedSound]) -> u64 {
    sounds.iter().map(CachedSound::size_bytes).sum()
}

/// Largest storage index across `sounds`, or 0 for an empty store.
pub fn max_storage_index(sounds: &[CachedSound]) -> u64 {
    sounds.iter().map(|s| s.storage_index).max().unwrap_or(0)
}
