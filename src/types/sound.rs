//! Sound metadata and the cached sound record.
//!
//! A [`CachedSound`] is the unit stored in the audio cache: the sound's
//! metadata as served by the catalog plus the audio blobs captured for it.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Canonical sound identifier shared with the server-side catalog.
pub type SoundId = i64;

/// Randomized pause between repetitions of a one-shot layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RepeatDelay {
    /// Shortest pause in seconds.
    pub min_secs: f32,
    /// Longest pause in seconds.
    pub max_secs: f32,
}

/// Descriptive fields mirrored from the canonical sound record.
///
/// The cache treats these as opaque; it only reads `id` and `audio_paths`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundMetadata {
    /// Primary key, identical to the catalog id.
    pub id: SoundId,

    /// Display name.
    pub sound_name: String,

    /// Image reference shown next to the sound.
    pub image_path: Option<String>,

    /// Remote audio paths, one per variant.
    pub audio_paths: Vec<String>,

    /// Whether the sound is a continuous loop or a one-shot clip.
    pub looping: bool,

    /// Default volume in 0.0..=1.0.
    pub volume: f32,

    /// Default echo amount.
    pub reverb: f32,

    /// Default echo tail in seconds.
    pub reverb_duration: f32,

    /// Default playback rate.
    pub speed: f32,

    /// Default stereo position in -1.0..=1.0.
    pub direction: f32,

    /// Catalog category.
    pub category: String,

    /// Repeat timing for one-shot clips.
    pub repeat_delay: Option<RepeatDelay>,
}

impl Default for SoundMetadata {
    fn default() -> Self {
        Self {
            id: 0,
            sound_name: String::new(),
            image_path: None,
            audio_paths: Vec::new(),
            looping: true,
            volume: 1.0,
            reverb: 0.0,
            reverb_duration: 0.0,
            speed: 1.0,
            direction: 0.0,
            category: String::new(),
            repeat_delay: None,
        }
    }
}

/// A sound stored in the cache: metadata plus captured audio.
///
/// `audios[i]` holds the bytes for `metadata.audio_paths[i]`. A shorter
/// vector, or an empty blob at some index, means that variant has not
/// been captured yet.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedSound {
    /// Metadata as served by the catalog.
    pub metadata: SoundMetadata,
    /// Captured audio blobs, index-aligned with `metadata.audio_paths`.
    pub audios: Vec<Bytes>,
    /// Insertion order marker, strictly increasing across inserts.
    pub storage_index: u64,
}

impl CachedSound {
    /// Creates a new cached sound.
    pub fn new(metadata: SoundMetadata, audios: Vec<Bytes>, storage_index: u64) -> Self {
        Self {
            metadata,
            audios,
            storage_index,
        }
    }

    /// Returns the sound id.
    pub fn id(&self) -> SoundId {
        self.metadata.id
    }

    /// Total bytes of all stored blobs.
    pub fn size_bytes(&self) -> u64 {
        self.audios.iter().map(|blob| blob.len() as u64).sum()
    }

    /// Returns the captured blob for a variant, if any.
    pub fn variant(&self, index: usize) -> Option<&Bytes> {
        self.audios.get(index).filter(|blob| !blob.is_empty())
    }

    /// Number of variants with captured audio.
    pub fn captured_variants(&self) -> usize {
        self.audios.iter().filter(|blob| !blob.is_empty()).count()
    }

    /// Returns true if every audio path has a captured blob.
    pub fn is_complete(&self) -> bool {
        let paths = self.metadata.audio_paths.len();
        (0..paths).all(|i| self.variant(i).is_some())
    }

    /// Returns a copy with `bytes` stored at `index`.
    ///
    /// Lower indices that were never captured are padded with empty blobs.
    pub fn with_variant(mut self, index: usize, bytes: Bytes) -> Self {
        if self.audios.len() <= index {
            self.audios.resize(index + 1, Bytes::new());
        }
        self.audios[index] = bytes;
        self
    }
}
