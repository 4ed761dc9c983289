//! Batch synchronization of the sounds used by the UI.
//!
//! Given the sounds the UI currently references, fetches every one that is
//! not cached yet and commits it through the eviction engine. Sounds are
//! processed one after another so that each eviction decision sees the
//! store as the previous commit left it.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cache::store::max_storage_index;
use crate::cache::EvictionEngine;
use crate::config::RetryConfig;
use crate::error::{CacheError, Result};
use crate::fetch::{fetch_all, BlobSource};
use crate::types::{Ambiance, CachedSound, SoundId, SoundMetadata};

/// Per-sound result of a sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Sounds fetched and stored.
    pub added: Vec<SoundId>,
    /// Sounds fetched but not stored because no ambiance was open.
    pub skipped: Vec<SoundId>,
    /// Sounds whose fetch or commit failed.
    pub failed: Vec<SoundId>,
    /// Sounds that were already in the store.
    pub already_cached: Vec<SoundId>,
    /// Number of sync passes made.
    pub attempts: u32,
}

impl SyncReport {
    /// Returns true if no sound failed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Folds the result of a retry pass into this report.
    fn absorb_retry(&mut self, retry: SyncReport) {
        self.added.extend(retry.added);
        for id in retry.skipped {
            if !self.skipped.contains(&id) {
                self.skipped.push(id);
            }
        }
        self.failed = retry.failed;
        self.attempts += retry.attempts;
    }
}

enum SyncStep {
    Stored,
    Skipped,
}

/// Reconciles the sounds in use against the cache.
#[derive(Clone)]
pub struct CacheSync {
    engine: EvictionEngine,
    source: Arc<dyn BlobSource>,
    fetch_timeout: Duration,
    retry: RetryConfig,
}

impl CacheSync {
    /// Creates a sync orchestrator.
    pub fn new(
        engine: EvictionEngine,
        source: Arc<dyn BlobSource>,
        fetch_timeout: Duration,
        retry: RetryConfig,
    ) -> Self {
        Self {
            engine,
            source,
            fetch_timeout,
            retry,
        }
    }

    /// Fetches and stores every used sound that is not cached yet.
    ///
    /// Never fails: each sound's failure is logged and recorded in the
    /// report, and the remaining sounds are still processed. Without an
    /// open ambiance nothing is persisted.
    pub async fn sync(
        &self,
        used_sounds: &[SoundMetadata],
        active_ambiance: Option<&Ambiance>,
    ) -> SyncReport {
        let existing = self.engine.store().get_all().await;
        let cached: HashSet<SoundId> = existing.iter().map(CachedSound::id).collect();
        let mut storage_index = max_storage_index(&existing);
        let working_set = active_ambiance.map(Ambiance::working_set);

        let mut report = SyncReport {
            attempts: 1,
            ..Default::default()
        };
        let mut seen = HashSet::new();

        for sound in used_sounds {
            if !seen.insert(sound.id) {
                continue;
            }
            if cached.contains(&sound.id) {
                report.already_cached.push(sound.id);
                continue;
            }

            match self
                .sync_one(sound, &mut storage_index, working_set.as_ref())
                .await
            {
                Ok(SyncStep::Stored) => report.added.push(sound.id),
                Ok(SyncStep::Skipped) => report.skipped.push(sound.id),
                Err(e) => {
                    warn!(sound_id = sound.id, error = %e, "sound sync failed");
                    report.failed.push(sound.id);
                }
            }
        }

        info!(
            added = report.added.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            cached = report.already_cached.len(),
            "cache sync finished"
        );
        report
    }

    /// Runs [`sync`](Self::sync) until no sound fails or attempts run out.
    ///
    /// Waits `base_delay`, then twice as long before each further attempt.
    /// Each pass only re-fetches sounds that are still missing.
    pub async fn sync_with_retry(
        &self,
        used_sounds: &[SoundMetadata],
        active_ambiance: Option<&Ambiance>,
    ) -> SyncReport {
        let attempts = self.retry.attempts.max(1);
        let mut delay = self.retry.base_delay();
        let mut report = self.sync(used_sounds, active_ambiance).await;

        for attempt in 2..=attempts {
            if report.is_complete() {
                break;
            }
            warn!(
                attempt,
                failed = report.failed.len(),
                delay_ms = delay.as_millis() as u64,
                "retrying cache sync"
            );
            tokio::time::sleep(delay).await;
            delay *= 2;

            let retry = self.sync(used_sounds, active_ambiance).await;
            report.absorb_retry(retry);
        }
        report
    }

    async fn sync_one(
        &self,
        sound: &SoundMetadata,
        storage_index: &mut u64,
        working_set: Option<&HashSet<SoundId>>,
    ) -> Result<SyncStep> {
        let blobs = tokio::time::timeout(
            self.fetch_timeout,
            fetch_all(self.source.as_ref(), &sound.audio_paths),
        )
        .await
        .map_err(|_| CacheError::fetch_timeout(&format!("sound {}", sound.id), self.fetch_timeout))?;

        if blobs.is_empty() {
            return Err(CacheError::fetch_failed(
                &format!("sound {}", sound.id),
                "no audio path could be fetched",
            ));
        }

        *storage_index += 1;
        let candidate = CachedSound::new(sound.clone(), blobs, *storage_index);

        let Some(working_set) = working_set else {
            debug!(sound_id = sound.id, "no ambiance open, not persisting");
            return Ok(SyncStep::Skipped);
        };

        self.engine.add_with_eviction(&candidate, working_set).await?;
        Ok(SyncStep::Stored)
    }
}
