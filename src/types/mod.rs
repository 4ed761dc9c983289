//! Core types for the audio cache.
//!
//! This module re-exports all the core data types used throughout the cache:
//! - [`SoundMetadata`]: A sound record as served by the catalog
//! - [`CachedSound`]: Metadata plus the audio blobs captured for it
//! - [`Ambiance`]: The open ambiance whose sounds form the working set
//! - [`Manifest`]: Sounds and ambiance handed to the binary as JSON

mod ambiance;
mod manifest;
mod sound;

// Re-export all types at the module level
pub use ambiance::{Ambiance, AmbianceSound};
pub use manifest::Manifest;
pub use sound::{CachedSound, RepeatDelay, SoundId, SoundMetadata};
