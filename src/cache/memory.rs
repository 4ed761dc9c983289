//! In-memory sound store.
//!
//! Provides the same upsert semantics as the SQLite store without touching
//! disk. Used for non-persistent sessions and as the baseline in tests.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::store::SoundStore;
use crate::error::Result;
use crate::types::{CachedSound, SoundId};

/// Sound store kept in process memory.
#[derive(Default)]
pub struct MemoryStore {
    /// Entries indexed by sound id.
    sounds: Mutex<HashMap<SoundId, CachedSound>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks if a sound id exists in the store.
    pub fn contains(&self, id: SoundId) -> bool {
        self.sounds.lock().contains_key(&id)
    }

    /// Returns the number of stored sounds.
    pub fn len(&self) -> usize {
        self.sounds.lock().len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.sounds.lock().is_empty()
    }
}

#[async_trait]
impl SoundStore for MemoryStore {
    async fn get_all(&self) -> Vec<CachedSound> {
        let mut sounds: Vec<CachedSound> = self.sounds.lock().values().cloned().collect();
        sounds.sort_by_key(|s| s.storage_index);
        sounds
    }

    async fn get_by_id(&self, id: SoundId) -> Option<CachedSound> {
        self.sounds.lock().get(&id).cloned()
    }

    async fn put(&self, sound: &CachedSound) -> Result<()> {
        self.sounds.lock().insert(sound.id(), sound.clone());
        Ok(())
    }

    async fn delete_by_id(&self, id: SoundId) -> Result<()> {
        self.sounds.lock().remove(&id);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.sounds.lock().clear();
        Ok(())
    }
}
