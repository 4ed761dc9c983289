//! Manifest describing the sounds a session uses.
//!
//! The catalog and the open ambiance live outside the cache; the binary
//! receives them as a JSON manifest instead.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::ambiance::Ambiance;
use super::sound::{SoundId, SoundMetadata};
use crate::error::{CacheError, Result};

/// Sounds used by the UI plus the ambiance currently open, if any.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub sounds: Vec<SoundMetadata>,
    #[serde(default)]
    pub ambiance: Option<Ambiance>,
}

impl Manifest {
    /// Reads a manifest from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CacheError::invalid_manifest(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::parse(&text)
    }

    /// Parses a manifest from JSON text.
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| CacheError::invalid_manifest(e.to_string()))
    }

    /// Looks up a sound by id.
    pub fn sound(&self, id: SoundId) -> Option<&SoundMetadata> {
        self.sounds.iter().find(|s| s.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn parses_sounds_and_ambiance() {
        let json = r#"{
            "sounds": [
                {"id": 1, "sound_name": "Rain", "audio_paths": ["rain.mp3"]},
                {"id": 2, "sound_name": "Wind", "audio_paths": ["wind_a.mp3", "wind_b.mp3"]}
            ],
            "ambiance": {"name": "storm", "sounds": [{"sound_id": 1}]}
        }"#;
        let manifest = Manifest::parse(json).unwrap();
        assert_eq!(manifest.sounds.len(), 2);
        assert_eq!(manifest.sound(2).unwrap().audio_paths.len(), 2);
        assert!(manifest.ambiance.unwrap().working_set().contains(&1));
    }

    #[test]
    fn ambiance_is_optional() {
        let manifest = Manifest::parse(r#"{"sounds": []}"#).unwrap();
        assert!(manifest.ambiance.is_none());
    }

    #[test]
    fn rejects_invalid_json() {
        let err = Manifest::parse("not json").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidManifest);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Manifest::load(Path::new("/nonexistent/manifest.json")).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidManifest);
        assert!(err.message.contains("cannot read"));
    }
}
