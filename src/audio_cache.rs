//! Cache facade used by the player and the command-line binary.
//!
//! Wires the store, quota oracle, eviction engine, fetcher and sync
//! orchestrator together from a [`CacheConfig`], and adds the playback
//! read-through: a cache hit is served from the store, a miss is fetched
//! once and captured in the background.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::cache::store::{max_storage_index, total_bytes};
use crate::cache::{
    DiskEstimator, EvictionEngine, FixedEstimator, MemoryStore, QuotaOracle, QuotaSnapshot,
    SoundStore, SqliteStore,
};
use crate::config::{CacheConfig, QuotaSource};
use crate::error::{CacheError, Result};
use crate::fetch::{BlobSource, HttpFetcher};
use crate::sync::{CacheSync, SyncReport};
use crate::types::{Ambiance, CachedSound, SoundId, SoundMetadata};

/// Store totals together with the current quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
    pub quota: QuotaSnapshot,
}

/// Per-sound locks serializing the read-merge-commit of captures.
#[derive(Default)]
struct CaptureLocks {
    locks: Mutex<HashMap<SoundId, Arc<tokio::sync::Mutex<()>>>>,
}

impl CaptureLocks {
    fn acquire(&self, id: SoundId) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.locks.lock().entry(id).or_default())
    }

    /// Forgets the lock for `id` once no capture holds or awaits it.
    fn release(&self, id: SoundId, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock();
        drop(lock);
        if locks.get(&id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(&id);
        }
    }
}

/// Client-side audio cache.
#[derive(Clone)]
pub struct AudioCache {
    store: Arc<dyn SoundStore>,
    quota: QuotaOracle,
    engine: EvictionEngine,
    source: Arc<dyn BlobSource>,
    sync: CacheSync,
    captures: Arc<CaptureLocks>,
}

impl AudioCache {
    /// Opens the cache described by `config`.
    ///
    /// The store itself connects lazily, so an unreachable cache directory
    /// only shows up as empty reads and failed writes.
    pub fn open(config: &CacheConfig) -> Result<Self> {
        if let Some(reason) = config.validate() {
            return Err(CacheError::invalid_config(reason));
        }

        let dir = config.effective_cache_path();

        let store: Arc<dyn SoundStore> = if config.in_memory {
            Arc::new(MemoryStore::new())
        } else {
            Arc::new(SqliteStore::open(&dir))
        };

        let quota = match config.quota_source {
            QuotaSource::Disk => QuotaOracle::new(Arc::new(DiskEstimator::new(dir.clone()))),
            QuotaSource::Fixed => match config.quota_bytes {
                Some(bytes) => QuotaOracle::new(Arc::new(FixedEstimator::new(bytes, Some(dir.clone())))),
                None => QuotaOracle::fallback(),
            },
            QuotaSource::None => QuotaOracle::fallback(),
        };

        let fetcher = HttpFetcher::new(config.base_url.as_deref(), config.request_timeout())?
            .with_max_blob_bytes(config.max_blob_bytes);

        debug!(
            path = %dir.display(),
            in_memory = config.in_memory,
            quota_source = %config.quota_source,
            "opened audio cache"
        );

        Ok(Self::from_parts(store, quota, Arc::new(fetcher), config))
    }

    /// Builds a cache from already constructed components.
    pub fn from_parts(
        store: Arc<dyn SoundStore>,
        quota: QuotaOracle,
        source: Arc<dyn BlobSource>,
        config: &CacheConfig,
    ) -> Self {
        let engine = EvictionEngine::new(store.clone(), quota.clone());
        let sync = CacheSync::new(
            engine.clone(),
            source.clone(),
            config.fetch_timeout(),
            config.retry.clone(),
        );

        Self {
            store,
            quota,
            engine,
            source,
            sync,
            captures: Arc::default(),
        }
    }

    pub fn store(&self) -> &Arc<dyn SoundStore> {
        &self.store
    }

    /// Fetches and stores every used sound not cached yet. See [`CacheSync::sync`].
    pub async fn sync(
        &self,
        used_sounds: &[SoundMetadata],
        active_ambiance: Option<&Ambiance>,
    ) -> SyncReport {
        self.sync.sync(used_sounds, active_ambiance).await
    }

    /// Like [`sync`](Self::sync), retrying with backoff while sounds fail.
    pub async fn sync_with_retry(
        &self,
        used_sounds: &[SoundMetadata],
        active_ambiance: Option<&Ambiance>,
    ) -> SyncReport {
        self.sync.sync_with_retry(used_sounds, active_ambiance).await
    }

    /// Returns the audio for one variant of a sound.
    ///
    /// A miss is fetched from the network and captured into the cache in
    /// the background. Fetch errors are returned; capture errors are only
    /// logged.
    pub async fn open_variant(
        &self,
        metadata: &SoundMetadata,
        variant: usize,
        working_set: &HashSet<SoundId>,
    ) -> Result<Bytes> {
        let (bytes, _capture) = self.read_through(metadata, variant, working_set).await?;
        Ok(bytes)
    }

    /// Same as [`open_variant`](Self::open_variant), also returning the
    /// capture task when one was started.
    pub async fn read_through(
        &self,
        metadata: &SoundMetadata,
        variant: usize,
        working_set: &HashSet<SoundId>,
    ) -> Result<(Bytes, Option<JoinHandle<()>>)> {
        if let Some(cached) = self.store.get_by_id(metadata.id).await {
            if let Some(bytes) = cached.variant(variant) {
                debug!(sound_id = metadata.id, variant, "cache hit");
                return Ok((bytes.clone(), None));
            }
        }

        let path = metadata.audio_paths.get(variant).ok_or_else(|| {
            CacheError::fetch_failed(
                &format!("sound {}", metadata.id),
                format!("no variant {}", variant),
            )
        })?;

        debug!(sound_id = metadata.id, variant, "cache miss");
        let bytes = self.source.fetch(path).await?;
        let capture = self.spawn_capture(
            metadata.clone(),
            variant,
            bytes.clone(),
            working_set.clone(),
        );

        Ok((bytes, Some(capture)))
    }

    /// Stores a variant fetched during playback without blocking the caller.
    ///
    /// The variant is merged into an existing entry, keeping its storage
    /// index, or becomes a new entry placed after every stored one.
    /// Captures of the same sound run one at a time, so concurrent
    /// variants are all kept.
    pub fn spawn_capture(
        &self,
        metadata: SoundMetadata,
        variant: usize,
        bytes: Bytes,
        working_set: HashSet<SoundId>,
    ) -> JoinHandle<()> {
        let store = self.store.clone();
        let engine = self.engine.clone();
        let captures = self.captures.clone();

        tokio::spawn(async move {
            let sound_id = metadata.id;
            let lock = captures.acquire(sound_id);
            let guard = lock.lock().await;

            let entry = match store.get_by_id(sound_id).await {
                Some(existing) => CachedSound {
                    metadata,
                    ..existing
                }
                .with_variant(variant, bytes),
                None => {
                    let index = max_storage_index(&store.get_all().await) + 1;
                    CachedSound::new(metadata, Vec::new(), index).with_variant(variant, bytes)
                }
            };

            match engine.add_with_eviction(&entry, &working_set).await {
                Ok(outcome) => debug!(
                    sound_id,
                    variant,
                    bytes = entry.size_bytes(),
                    evicted = outcome.evicted.len(),
                    "captured variant"
                ),
                Err(e) => error!(sound_id, variant, error = %e, "failed to capture variant"),
            }

            drop(guard);
            captures.release(sound_id, lock);
        })
    }

    /// Entry count, stored bytes and the current quota.
    pub async fn stats(&self) -> CacheStats {
        let sounds = self.store.get_all().await;
        CacheStats {
            entries: sounds.len(),
            total_bytes: total_bytes(&sounds),
            quota: self.quota.snapshot().await,
        }
    }

    /// All entries in storage order.
    pub async fn list(&self) -> Vec<CachedSound> {
        self.store.get_all().await
    }

    pub async fn get(&self, id: SoundId) -> Option<CachedSound> {
        self.store.get_by_id(id).await
    }

    pub async fn remove(&self, id: SoundId) -> Result<()> {
        self.store.delete_by_id(id).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await
    }
}

/// Picks a random variant index for a one-shot layer.
///
/// Returns None if the sound has no audio paths.
pub fn pick_variant<R: Rng + ?Sized>(metadata: &SoundMetadata, rng: &mut R) -> Option<usize> {
    match metadata.audio_paths.len() {
        0 => None,
        n => Some(rng.gen_range(0..n)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::eviction::tests::FlakyStore;
    use crate::cache::FALLBACK_QUOTA_BYTES;
    use crate::error::ErrorCode;
    use crate::fetch::tests::FakeSource;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn metadata(id: SoundId) -> SoundMetadata {
        SoundMetadata {
            id,
            sound_name: format!("sound {}", id),
            audio_paths: vec![format!("{}/0.mp3", id), format!("{}/1.mp3", id)],
            ..Default::default()
        }
    }

    fn cache_with(store: Arc<dyn SoundStore>, source: FakeSource) -> AudioCache {
        AudioCache::from_parts(
            store,
            QuotaOracle::fallback(),
            Arc::new(source),
            &CacheConfig::default(),
        )
    }

    #[tokio::test]
    async fn hit_is_served_from_store() {
        let store = Arc::new(MemoryStore::new());
        store
            .put(&CachedSound::new(
                metadata(1),
                vec![Bytes::from_static(b"cached")],
                1,
            ))
            .await
            .unwrap();
        let source = FakeSource {
            failing: ["1/0.mp3".to_string()].into_iter().collect(),
            ..Default::default()
        };
        let cache = cache_with(store, source);

        let (bytes, capture) = cache
            .read_through(&metadata(1), 0, &HashSet::new())
            .await
            .unwrap();

        assert_eq!(bytes.as_ref(), b"cached");
        assert!(capture.is_none());
    }

    #[tokio::test]
    async fn miss_is_fetched_and_captured() {
        let store = Arc::new(MemoryStore::new());
        let cache = cache_with(store.clone(), FakeSource::default());
        let working_set: HashSet<SoundId> = [1].into_iter().collect();

        let (bytes, capture) = cache
            .read_through(&metadata(1), 1, &working_set)
            .await
            .unwrap();
        assert_eq!(bytes.as_ref(), b"1/1.mp3");
        capture.unwrap().await.unwrap();

        let stored = store.get_by_id(1).await.unwrap();
        assert_eq!(stored.variant(1).unwrap().as_ref(), b"1/1.mp3");
        assert!(stored.variant(0).is_none());
        assert_eq!(stored.storage_index, 1);
    }

    #[tokio::test]
    async fn capture_merges_into_existing_entry() {
        let store = Arc::new(MemoryStore::new());
        store
            .put(&CachedSound::new(
                metadata(1),
                vec![Bytes::from_static(b"first")],
                7,
            ))
            .await
            .unwrap();
        let cache = cache_with(store.clone(), FakeSource::default());

        cache
            .spawn_capture(metadata(1), 1, Bytes::from_static(b"second"), HashSet::new())
            .await
            .unwrap();

        let stored = store.get_by_id(1).await.unwrap();
        assert_eq!(stored.storage_index, 7);
        assert!(stored.is_complete());
        assert_eq!(stored.variant(0).unwrap().as_ref(), b"first");
    }

    #[tokio::test]
    async fn new_capture_is_placed_after_existing_entries() {
        let store = Arc::new(MemoryStore::new());
        store
            .put(&CachedSound::new(metadata(1), vec![Bytes::from_static(b"x")], 4))
            .await
            .unwrap();
        let cache = cache_with(store.clone(), FakeSource::default());

        cache
            .spawn_capture(metadata(2), 0, Bytes::from_static(b"y"), HashSet::new())
            .await
            .unwrap();

        assert_eq!(store.get_by_id(2).await.unwrap().storage_index, 5);
    }

    #[tokio::test]
    async fn fetch_error_reaches_the_player() {
        let store = Arc::new(MemoryStore::new());
        let source = FakeSource {
            failing: ["1/0.mp3".to_string()].into_iter().collect(),
            ..Default::default()
        };
        let cache = cache_with(store.clone(), source);

        let err = cache
            .open_variant(&metadata(1), 0, &HashSet::new())
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::FetchFailed);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn unknown_variant_is_an_error() {
        let cache = cache_with(Arc::new(MemoryStore::new()), FakeSource::default());
        let err = cache
            .open_variant(&metadata(1), 5, &HashSet::new())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::FetchFailed);
    }

    #[tokio::test]
    async fn failed_capture_does_not_affect_playback() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            fail_puts_for: [1].into_iter().collect(),
        });
        let cache = cache_with(store.clone(), FakeSource::default());

        let (bytes, capture) = cache
            .read_through(&metadata(1), 0, &HashSet::new())
            .await
            .unwrap();

        assert_eq!(bytes.as_ref(), b"1/0.mp3");
        capture.unwrap().await.unwrap();
        assert!(store.inner.is_empty());
    }

    #[tokio::test]
    async fn stats_report_store_totals() {
        let store = Arc::new(MemoryStore::new());
        store
            .put(&CachedSound::new(metadata(1), vec![Bytes::from(vec![0u8; 10])], 1))
            .await
            .unwrap();
        store
            .put(&CachedSound::new(metadata(2), vec![Bytes::from(vec![0u8; 5])], 2))
            .await
            .unwrap();
        let cache = cache_with(store, FakeSource::default());

        let stats = cache.stats().await;
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.total_bytes, 15);
        assert_eq!(stats.quota.allowed_bytes, FALLBACK_QUOTA_BYTES);
    }

    #[tokio::test]
    async fn remove_and_clear_delegate_to_store() {
        let store = Arc::new(MemoryStore::new());
        for id in 1..=3 {
            store
                .put(&CachedSound::new(metadata(id), vec![Bytes::from_static(b"x")], id as u64))
                .await
                .unwrap();
        }
        let cache = cache_with(store.clone(), FakeSource::default());

        cache.remove(2).await.unwrap();
        assert!(cache.get(2).await.is_none());
        assert_eq!(cache.list().await.len(), 2);

        cache.clear().await.unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn pick_variant_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(42);
        let sound = metadata(1);
        for _ in 0..50 {
            let index = pick_variant(&sound, &mut rng).unwrap();
            assert!(index < sound.audio_paths.len());
        }
    }

    #[test]
    fn pick_variant_of_silent_sound_is_none() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(pick_variant(&SoundMetadata::default(), &mut rng), None);
    }

    #[test]
    fn open_rejects_invalid_config() {
        let config = CacheConfig {
            quota_source: QuotaSource::Fixed,
            quota_bytes: None,
            ..Default::default()
        };
        let err = AudioCache::open(&config).err().unwrap();
        assert_eq!(err.code, ErrorCode::InvalidConfig);
    }

    #[tokio::test]
    async fn open_on_disk_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let config = CacheConfig {
            cache_path: Some(dir.path().to_path_buf()),
            quota_source: QuotaSource::Fixed,
            quota_bytes: Some(1024 * 1024),
            ..Default::default()
        };
        let cache = AudioCache::open(&config).unwrap();

        cache
            .spawn_capture(metadata(1), 0, Bytes::from_static(b"rain"), HashSet::new())
            .await
            .unwrap();

        let reopened = AudioCache::open(&config).unwrap();
        let stored = reopened.get(1).await.unwrap();
        assert_eq!(stored.variant(0).unwrap().as_ref(), b"rain");
        assert_eq!(reopened.stats().await.quota.quota, 1024 * 1024);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_captures_keep_every_variant() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn SoundStore> = Arc::new(SqliteStore::open(dir.path()));
        let cache = cache_with(store.clone(), FakeSource::default());

        for id in 1..=20 {
            let first = cache.spawn_capture(
                metadata(id),
                0,
                Bytes::from_static(b"AAAA"),
                HashSet::new(),
            );
            let second = cache.spawn_capture(
                metadata(id),
                1,
                Bytes::from_static(b"BBBB"),
                HashSet::new(),
            );
            first.await.unwrap();
            second.await.unwrap();

            let stored = store.get_by_id(id).await.unwrap();
            assert_eq!(stored.captured_variants(), 2, "sound {}", id);
            assert_eq!(stored.variant(0).unwrap().as_ref(), b"AAAA");
            assert_eq!(stored.variant(1).unwrap().as_ref(), b"BBBB");
        }

        assert!(cache.captures.locks.lock().is_empty());
    }
}
