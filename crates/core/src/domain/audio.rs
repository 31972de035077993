//! Decoded audio buffers and the engine's error taxonomy
//!
//! Buffers arrive here already decoded and validated by an external step
//! (see the `infra` crate for the Symphonia-backed decoder). The engine never
//! mutates a buffer it has been handed; reloading replaces it wholesale.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur in the audio subsystem
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AudioError {
    /// Malformed or unsupported audio data
    #[error("Failed to decode audio: {0}")]
    DecodeFailure(String),

    /// A source buffer is required for this operation
    #[error("No audio loaded")]
    NoSourceLoaded,

    /// Reference monitoring was requested without a reference buffer
    #[error("No reference audio loaded")]
    NoReferenceLoaded,

    /// Offline pipeline construction or rendering failed
    #[error("Render failed: {0}")]
    RenderFailure(String),

    /// Invalid configuration for a stage or buffer
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Preset id is not part of the catalog
    #[error("Preset not found: {0}")]
    PresetNotFound(String),
}

pub type Result<T> = std::result::Result<T, AudioError>;

/// Number of audio channels the engine handles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelCount {
    Mono,
    Stereo,
}

impl ChannelCount {
    pub fn count(&self) -> usize {
        match self {
            ChannelCount::Mono => 1,
            ChannelCount::Stereo => 2,
        }
    }

    pub fn from_count(count: usize) -> Result<Self> {
        match count {
            1 => Ok(ChannelCount::Mono),
            2 => Ok(ChannelCount::Stereo),
            n => Err(AudioError::InvalidConfiguration(format!(
                "unsupported channel count {n} (expected 1 or 2)"
            ))),
        }
    }

    pub fn is_stereo(&self) -> bool {
        matches!(self, ChannelCount::Stereo)
    }
}

/// Summary of a loaded buffer, as shown next to a track
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BufferMetadata {
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Decoded PCM audio with planar channel storage
///
/// Samples are nominally in [-1.0, 1.0]. Every channel has the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    /// Create a buffer from planar channel data
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Result<Self> {
        if sample_rate == 0 {
            return Err(AudioError::DecodeFailure("sample rate must be non-zero".into()));
        }
        ChannelCount::from_count(channels.len())
            .map_err(|e| AudioError::DecodeFailure(e.to_string()))?;

        let frames = channels[0].len();
        if channels.iter().any(|c| c.len() != frames) {
            return Err(AudioError::DecodeFailure(
                "channels have different lengths".into(),
            ));
        }

        Ok(Self {
            sample_rate,
            channels,
        })
    }

    /// Create a buffer from frame-major interleaved samples
    pub fn from_interleaved(sample_rate: u32, channels: usize, samples: &[f32]) -> Result<Self> {
        if channels == 0 || samples.len() % channels != 0 {
            return Err(AudioError::DecodeFailure(format!(
                "{} samples cannot be split into {} channels",
                samples.len(),
                channels
            )));
        }

        let frames = samples.len() / channels;
        let mut planar = vec![Vec::with_capacity(frames); channels];
        for frame in samples.chunks_exact(channels) {
            for (ch, sample) in frame.iter().enumerate() {
                planar[ch].push(*sample);
            }
        }

        Self::new(sample_rate, planar)
    }

    /// Create a silent buffer
    pub fn silence(sample_rate: u32, channels: usize, frames: usize) -> Result<Self> {
        Self::new(sample_rate, vec![vec![0.0; frames]; channels])
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> ChannelCount {
        // Validated on construction
        if self.channels.len() == 2 {
            ChannelCount::Stereo
        } else {
            ChannelCount::Mono
        }
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Number of sample frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn channels(&self) -> impl Iterator<Item = &[f32]> {
        self.channels.iter().map(Vec::as_slice)
    }

    /// Copy frames `[start, start + frames)` into `out` as interleaved samples
    ///
    /// Returns the number of frames copied.
    pub fn read_interleaved(&self, start: usize, out: &mut [f32]) -> usize {
        let channels = self.num_channels();
        let available = self.frames().saturating_sub(start);
        let frames = (out.len() / channels).min(available);

        for (i, frame) in out.chunks_exact_mut(channels).take(frames).enumerate() {
            for (ch, sample) in frame.iter_mut().enumerate() {
                *sample = self.channels[ch][start + i];
            }
        }

        frames
    }

    /// All samples in frame-major interleaved order
    pub fn interleaved(&self) -> Vec<f32> {
        let mut out = vec![0.0; self.frames() * self.num_channels()];
        self.read_interleaved(0, &mut out);
        out
    }

    /// Largest absolute sample value across all channels
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flat_map(|c| c.iter())
            .fold(0.0_f32, |peak, s| peak.max(s.abs()))
    }

    pub fn metadata(&self) -> BufferMetadata {
        BufferMetadata {
            duration_secs: self.duration_secs(),
            sample_rate: self.sample_rate,
            channels: self.num_channels() as u16,
        }
    }
}
