//! Ambiance type representing the set of sounds currently open.
//!
//! The cache only reads the sound ids out of an ambiance; the mix
//! parameters are carried so that manifests round-trip unchanged.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::sound::SoundId;

/// One placed sound inside an ambiance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmbianceSound {
    /// Catalog id of the placed sound.
    pub sound_id: SoundId,
    pub volume: f32,
    pub direction: f32,
    pub speed: f32,
    pub reverb: f32,
    pub reverb_duration: f32,
    pub low_gain: f32,
    pub mid_gain: f32,
    pub high_gain: f32,
    pub repeat_delay_min: Option<f32>,
    pub repeat_delay_max: Option<f32>,
}

impl Default for AmbianceSound {
    fn default() -> Self {
        Self {
            sound_id: 0,
            volume: 1.0,
            direction: 0.0,
            speed: 1.0,
            reverb: 0.0,
            reverb_duration: 0.0,
            low_gain: 0.0,
            mid_gain: 0.0,
            high_gain: 0.0,
            repeat_delay_min: None,
            repeat_delay_max: None,
        }
    }
}

impl AmbianceSound {
    /// Creates a placement with default mix parameters.
    pub fn new(sound_id: SoundId) -> Self {
        Self {
            sound_id,
            ..Default::default()
        }
    }
}

/// A named collection of layered sounds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ambiance {
    pub id: Option<i64>,
    pub name: String,
    pub sounds: Vec<AmbianceSound>,
}

impl Ambiance {
    /// Creates an ambiance placing each of `sound_ids` once.
    pub fn with_sounds(name: impl Into<String>, sound_ids: &[SoundId]) -> Self {
        Self {
            id: None,
            name: name.into(),
            sounds: sound_ids.iter().copied().map(AmbianceSound::new).collect(),
        }
    }

    /// Ids that must survive eviction while this ambiance is open.
    pub fn working_set(&self) -> HashSet<SoundId> {
        self.sounds.iter().map(|s| s.sound_id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn working_set_deduplicates_placements() {
        let ambiance = Ambiance::with_sounds("forest", &[1, 2, 2, 5]);
        let set = ambiance.working_set();
        assert_eq!(set.len(), 3);
        assert!(set.contains(&1) && set.contains(&2) && set.contains(&5));
    }

    #[test]
    fn empty_ambiance_has_empty_working_set() {
        assert!(Ambiance::default().working_set().is_empty());
    }

    #[test]
    fn deserializes_placements_with_defaults() {
        let json = r#"{"name": "storm", "sounds": [{"sound_id": 3, "volume": 0.4}]}"#;
        let ambiance: Ambiance = serde_json::from_str(json).unwrap();
        assert_eq!(ambiance.sounds[0].sound_id, 3);
        assert_eq!(ambiance.sounds[0].volume, 0.4);
        assert_eq!(ambiance.sounds[0].speed, 1.0);
    }
}
