//! Quota-driven eviction for cache inserts.
//!
//! Before a candidate is stored, the engine checks whether it fits under
//! the allowed ceiling. If not, every entry outside the active working set
//! is removed; if that is still not enough, the whole store is cleared.
//! The candidate is inserted last, exactly once.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::quota::QuotaOracle;
use super::store::SoundStore;
use crate::error::Result;
use crate::types::{CachedSound, SoundId};

/// What an insert had to do to make room.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionOutcome {
    /// Ids removed by the eviction pass.
    pub evicted: Vec<SoundId>,
    /// Bytes freed by the eviction pass.
    pub reclaimed_bytes: u64,
    /// True if the full-clear fallback ran.
    pub cleared: bool,
    /// Ceiling the decision was made against.
    pub allowed_bytes: u64,
}

impl EvictionOutcome {
    /// Returns true if anything was removed.
    pub fn evicted_any(&self) -> bool {
        self.cleared || !self.evicted.is_empty()
    }
}

/// Inserts sounds into a store, evicting under quota pressure.
#[derive(Clone)]
pub struct EvictionEngine {
    store: Arc<dyn SoundStore>,
    quota: QuotaOracle,
}

impl EvictionEngine {
    pub fn new(store: Arc<dyn SoundStore>, quota: QuotaOracle) -> Self {
        Self { store, quota }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &Arc<dyn SoundStore> {
        &self.store
    }

    /// Stores `candidate`, making room first if the quota requires it.
    ///
    /// Entries whose id is in `working_set` are never evicted unless the
    /// full-clear fallback triggers. An existing entry with the candidate's
    /// id is not counted, since the insert replaces it. Only the final
    /// insert reports an error; failed reads count as an empty store.
    pub async fn add_with_eviction(
        &self,
        candidate: &CachedSound,
        working_set: &HashSet<SoundId>,
    ) -> Result<EvictionOutcome> {
        let candidate_id = candidate.id();
        let candidate_bytes = candidate.size_bytes();
        let allowed = self.quota.snapshot().await.allowed_bytes;

        let existing = self.store.get_all().await;
        let current = bytes_excluding(&existing, candidate_id);

        let mut outcome = EvictionOutcome {
            allowed_bytes: allowed,
            ..Default::default()
        };

        if current.saturating_add(candidate_bytes) > allowed {
            info!(
                sound_id = candidate_id,
                current,
                candidate_bytes,
                allowed,
                "cache over quota, evicting sounds outside the working set"
            );

            for sound in &existing {
                let id = sound.id();
                if id == candidate_id || working_set.contains(&id) {
                    continue;
                }
                match self.store.delete_by_id(id).await {
                    Ok(()) => {
                        outcome.evicted.push(id);
                        outcome.reclaimed_bytes += sound.size_bytes();
                    }
                    Err(e) => warn!(sound_id = id, error = %e, "evicting sound failed"),
                }
            }

            let remaining = bytes_excluding(&self.store.get_all().await, candidate_id);
            if remaining.saturating_add(candidate_bytes) > allowed {
                warn!(
                    sound_id = candidate_id,
                    remaining,
                    candidate_bytes,
                    allowed,
                    "working set alone exceeds quota, clearing cache"
                );
                match self.store.clear().await {
                    Ok(()) => outcome.cleared = true,
                    Err(e) => warn!(error = %e, "clearing cache failed"),
                }
            }
        }

        self.store.put(candidate).await?;
        debug!(
            sound_id = candidate_id,
            bytes = candidate_bytes,
            evicted = outcome.evicted.len(),
            cleared = outcome.cleared,
            "sound committed"
        );
        Ok(outcome)
    }
}

/// Stored bytes across `sounds`, skipping `id`.
///
/// Unlike a plain sum over the store, the candidate's own stored entry is
/// left out on purpose: the insert replaces it, so it is never counted twice.
fn bytes_excluding(sounds: &[CachedSound], id: SoundId) -> u64 {
    sounds
        .iter()
        .filter(|s| s.id() != id)
        .map(CachedSound::size_bytes)
        .sum()
}
