//! Mastering presets and the preset catalog
//!
//! A preset is plain data: every parameter the signal chain needs for one
//! mastering style. Presets are identified by a stable string id; the display
//! name is for humans only.

use crate::domain::audio::{AudioError, Result};
use crate::domain::dsp::{
    CompressorParams, LimiterParams, PeakParams, SaturationParams, ShelfParams, StereoWidthParams,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Three-band EQ settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EqSettings {
    pub low_shelf: ShelfParams,
    pub mid_peak: PeakParams,
    pub high_shelf: ShelfParams,
}

/// Immutable parameter bundle describing one mastering style
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasteringPreset {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub eq: EqSettings,
    pub compression: CompressorParams,
    pub limiter: LimiterParams,
    #[serde(default)]
    pub saturation: Option<SaturationParams>,
    #[serde(default)]
    pub stereo_width: Option<StereoWidthParams>,
    /// Linear gain applied after every other stage
    pub output_gain: f32,
}

impl MasteringPreset {
    /// Drive the saturation stage actually runs with (0 when disabled or absent)
    pub fn saturation_drive(&self) -> f32 {
        self.saturation
            .map(|s| s.effective_drive())
            .unwrap_or(0.0)
    }

    pub fn width_enabled(&self) -> bool {
        self.stereo_width.is_some_and(|w| w.enabled)
    }

    /// Stereo width, 1.0 when the stage is not enabled
    pub fn width(&self) -> f32 {
        match self.stereo_width {
            Some(w) if w.enabled => w.width,
            _ => 1.0,
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn builtin(
    id: &str,
    name: &str,
    description: &str,
    eq: [f32; 7],
    compression: [f32; 5],
    limiter: [f32; 2],
    saturation: (bool, f32),
    stereo_width: (bool, f32),
    output_gain: f32,
) -> MasteringPreset {
    let [low_freq, low_gain, mid_freq, mid_gain, mid_q, high_freq, high_gain] = eq;
    let [threshold_db, knee_db, ratio, attack_sec, release_sec] = compression;

    MasteringPreset {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        eq: EqSettings {
            low_shelf: ShelfParams {
                freq: low_freq,
                gain_db: low_gain,
            },
            mid_peak: PeakParams {
                freq: mid_freq,
                gain_db: mid_gain,
                q: mid_q,
            },
            high_shelf: ShelfParams {
                freq: high_freq,
                gain_db: high_gain,
            },
        },
        compression: CompressorParams {
            threshold_db,
            knee_db,
            ratio,
            attack_sec,
            release_sec,
        },
        limiter: LimiterParams {
            threshold_db: limiter[0],
            release_sec: limiter[1],
        },
        saturation: Some(SaturationParams {
            enabled: saturation.0,
            drive: saturation.1,
        }),
        stereo_width: Some(StereoWidthParams {
            enabled: stereo_width.0,
            width: stereo_width.1,
        }),
        output_gain,
    }
}

fn builtin_presets() -> Vec<MasteringPreset> {
    vec![
        builtin(
            "clean",
            "Clean",
            "Transparent mastering for well-balanced mixes",
            [80.0, 1.2, 2000.0, 0.5, 0.7, 10000.0, 1.2],
            [-18.0, 6.0, 2.5, 0.003, 0.25],
            [-1.0, 0.05],
            (false, 0.0),
            (true, 1.1),
            2.2,
        ),
        builtin(
            "warm",
            "Warm",
            "Adds warmth and analog character",
            [100.0, 2.5, 1000.0, -0.5, 1.0, 8000.0, -0.5],
            [-16.0, 8.0, 3.5, 0.005, 0.3],
            [-0.5, 0.08],
            (true, 15.0),
            (true, 1.0),
            3.2,
        ),
        builtin(
            "loud",
            "Loud",
            "Maximum loudness for streaming platforms",
            [60.0, 2.0, 3000.0, 1.5, 0.8, 12000.0, 2.5],
            [-20.0, 10.0, 5.0, 0.001, 0.2],
            [-0.3, 0.03],
            (true, 10.0),
            (true, 1.15),
            4.5,
        ),
        builtin(
            "bass",
            "Bass Boost",
            "Enhanced low-end for bass-heavy genres",
            [80.0, 4.5, 200.0, 2.5, 1.2, 10000.0, 0.5],
            [-16.0, 8.0, 3.5, 0.01, 0.35],
            [-0.5, 0.1],
            (true, 20.0),
            (true, 0.95),
            3.0,
        ),
        builtin(
            "bright",
            "Bright",
            "Adds clarity and presence",
            [100.0, 0.0, 4000.0, 2.5, 0.9, 8000.0, 3.5],
            [-18.0, 6.0, 2.5, 0.002, 0.25],
            [-0.8, 0.05],
            (false, 0.0),
            (true, 1.2),
            2.8,
        ),
        builtin(
            "vintage",
            "Vintage",
            "Classic analog tape sound with rich harmonics",
            [120.0, 2.0, 800.0, 1.0, 1.5, 6000.0, -1.5],
            [-14.0, 10.0, 4.0, 0.008, 0.4],
            [-0.8, 0.1],
            (true, 25.0),
            (true, 0.9),
            3.5,
        ),
        builtin(
            "modern",
            "Modern",
            "Contemporary sound with wide stereo and punch",
            [70.0, 2.5, 2500.0, 1.5, 0.6, 10000.0, 2.0],
            [-19.0, 7.0, 4.0, 0.002, 0.22],
            [-0.4, 0.04],
            (true, 12.0),
            (true, 1.3),
            4.0,
        ),
        builtin(
            "voiceClean",
            "Voice Clean",
            "Optimized for vocal clarity and intelligibility",
            [120.0, -2.5, 3000.0, 2.8, 1.0, 8000.0, -1.0],
            [-16.0, 8.0, 3.0, 0.005, 0.3],
            [-1.0, 0.06],
            (false, 0.0),
            (true, 1.0),
            2.5,
        ),
    ]
}

/// Ordered catalog of presets keyed by id
///
/// Built-in entries come first in a fixed order; user presets follow and can
/// never shadow a built-in id.
#[derive(Debug, Clone)]
pub struct PresetCatalog {
    presets: Vec<MasteringPreset>,
    builtin_count: usize,
}

impl PresetCatalog {
    /// The fixed catalog that ships with the engine
    pub fn builtin() -> Self {
        let presets = builtin_presets();
        let builtin_count = presets.len();
        Self {
            presets,
            builtin_count,
        }
    }

    /// Extend the catalog with user-defined presets
    ///
    /// Entries whose id is already taken are skipped with a warning.
    pub fn with_user_presets(mut self, presets: impl IntoIterator<Item = MasteringPreset>) -> Self {
        for preset in presets {
            if let Err(e) = self.insert(preset) {
                warn!("Skipping user preset: {}", e);
            }
        }
        self
    }

    /// Add one preset; fails if the id is already in the catalog
    pub fn insert(&mut self, preset: MasteringPreset) -> Result<()> {
        if self.contains(&preset.id) {
            return Err(AudioError::InvalidConfiguration(format!(
                "preset id '{}' already exists",
                preset.id
            )));
        }

        debug!("Adding preset '{}' to catalog", preset.id);
        self.presets.push(preset);
        Ok(())
    }

    /// Look up a preset by id
    pub fn get(&self, id: &str) -> Result<&MasteringPreset> {
        self.presets
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| AudioError::PresetNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.presets.iter().any(|p| p.id == id)
    }

    pub fn is_builtin(&self, id: &str) -> bool {
        self.presets[..self.builtin_count].iter().any(|p| p.id == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.presets.iter().map(|p| p.id.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &MasteringPreset> {
        self.presets.iter()
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}

impl Default for PresetCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
