//! The mastering signal chain
//!
//! Fixed stage order:
//! low-shelf -> mid-peak -> high-shelf -> saturation -> compressor ->
//! limiter -> [stereo width] -> output gain
//!
//! Parameters and topology are set independently: most preset switches only
//! push parameters, while a new channel count or a width toggle also changes
//! which stages are wired.

pub mod topology;

use crate::domain::audio::{AudioBuffer, AudioError, ChannelCount, Result};
use crate::domain::dsp::{
    BandKind, Compressor, CompressorParams, Effect, EqBand, Limiter, LimiterParams, OutputGain,
    Saturator, StereoWidth,
};
use crate::domain::preset::MasteringPreset;
use tracing::{debug, trace};

pub use topology::{ChainTopology, Edge, GraphTopology, Node, StageId, TopologyDiff};

/// Owned pipeline of processing stages
#[derive(Debug, Clone)]
pub struct SignalChain {
    sample_rate: u32,
    width_enabled: bool,
    topology: ChainTopology,
    low_shelf: EqBand,
    mid_peak: EqBand,
    high_shelf: EqBand,
    saturator: Saturator,
    compressor: Compressor,
    limiter: Limiter,
    stereo_width: StereoWidth,
    output_gain: OutputGain,
}

impl SignalChain {
    /// Create a chain with neutral parameters on every stage
    pub fn new(sample_rate: u32, channels: ChannelCount) -> Self {
        Self {
            sample_rate,
            width_enabled: false,
            topology: ChainTopology::derive(channels, false),
            low_shelf: EqBand::new(BandKind::LowShelf, sample_rate),
            mid_peak: EqBand::new(BandKind::Peaking, sample_rate),
            high_shelf: EqBand::new(BandKind::HighShelf, sample_rate),
            saturator: Saturator::new(),
            compressor: Compressor::new(sample_rate),
            limiter: Limiter::new(sample_rate),
            stereo_width: StereoWidth::default(),
            output_gain: OutputGain::default(),
        }
    }

    /// Create a chain configured for `preset`
    pub fn for_preset(sample_rate: u32, channels: ChannelCount, preset: &MasteringPreset) -> Self {
        let mut chain = Self::new(sample_rate, channels);
        chain.apply_preset(preset);
        chain
    }

    /// Push every stage parameter from `preset` and re-derive the topology
    ///
    /// Returns `true` if the stage layout changed.
    pub fn apply_preset(&mut self, preset: &MasteringPreset) -> bool {
        self.low_shelf.set_shelf(preset.eq.low_shelf);
        self.mid_peak.set_peak(preset.eq.mid_peak);
        self.high_shelf.set_shelf(preset.eq.high_shelf);
        self.saturator.set_drive(preset.saturation_drive());
        self.compressor.set_params(preset.compression);
        self.limiter.set_params(preset.limiter);
        self.stereo_width.set_width(preset.width());
        self.output_gain.set_gain(preset.output_gain);

        debug!("Applied preset '{}' to signal chain", preset.id);

        self.width_enabled = preset.width_enabled();
        self.rewire(self.topology.channels())
    }

    /// Reset every stage to neutral parameters
    pub fn clear_preset(&mut self) -> bool {
        let channels = self.topology.channels();
        let topology_before = self.topology;
        *self = Self::new(self.sample_rate, channels);
        topology_before != self.topology
    }

    /// Re-derive the stage layout for a channel count
    ///
    /// Returns `true` if the layout changed.
    pub fn rewire(&mut self, channels: ChannelCount) -> bool {
        let next = ChainTopology::derive(channels, self.width_enabled);
        if next == self.topology {
            return false;
        }

        debug!(
            "Rewiring chain: {:?} -> {:?}",
            self.topology.stages(),
            next.stages()
        );
        self.topology = next;
        true
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        if sample_rate == self.sample_rate {
            return;
        }

        self.sample_rate = sample_rate;
        self.low_shelf.set_sample_rate(sample_rate);
        self.mid_peak.set_sample_rate(sample_rate);
        self.high_shelf.set_sample_rate(sample_rate);
        self.compressor.set_sample_rate(sample_rate);
        self.limiter.set_sample_rate(sample_rate);
        debug!("Signal chain sample rate set to {}Hz", sample_rate);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn topology(&self) -> ChainTopology {
        self.topology
    }

    pub fn channels(&self) -> usize {
        self.topology.channels().count()
    }

    fn stage_mut(&mut self, id: StageId) -> &mut dyn Effect {
        match id {
            StageId::LowShelf => &mut self.low_shelf,
            StageId::MidPeak => &mut self.mid_peak,
            StageId::HighShelf => &mut self.high_shelf,
            StageId::Saturation => &mut self.saturator,
            StageId::Compressor => &mut self.compressor,
            StageId::Limiter => &mut self.limiter,
            StageId::StereoWidth => &mut self.stereo_width,
            StageId::OutputGain => &mut self.output_gain,
        }
    }

    /// Run an interleaved block through every wired stage in order
    pub fn process(&mut self, frames: &mut [f32]) -> Result<()> {
        let channels = self.channels();
        for id in self.topology.stages() {
            self.stage_mut(*id).process(frames, channels)?;
        }
        trace!("Processed {} frames", frames.len() / channels);
        Ok(())
    }

    /// Process a whole buffer in blocks of `block_size` frames
    ///
    /// The buffer's channel count must match the chain's layout.
    pub fn process_buffer(&mut self, buffer: &AudioBuffer, block_size: usize) -> Result<AudioBuffer> {
        let channels = self.channels();
        if buffer.num_channels() != channels {
            return Err(AudioError::InvalidConfiguration(format!(
                "chain is wired for {} channels, buffer has {}",
                channels,
                buffer.num_channels()
            )));
        }
        if block_size == 0 {
            return Err(AudioError::InvalidConfiguration(
                "block size must be non-zero".into(),
            ));
        }

        let mut samples = buffer.interleaved();
        for block in samples.chunks_mut(block_size * channels) {
            self.process(block)?;
        }

        AudioBuffer::from_interleaved(buffer.sample_rate(), channels, &samples)
    }

    /// Clear all filter memories and envelopes
    pub fn reset(&mut self) {
        for id in self.topology.stages() {
            self.stage_mut(*id).reset();
        }
    }

    pub fn saturator(&self) -> &Saturator {
        &self.saturator
    }

    pub fn compressor_params(&self) -> CompressorParams {
        self.compressor.params()
    }

    pub fn limiter_params(&self) -> LimiterParams {
        self.limiter.params()
    }

    pub fn stereo_width(&self) -> &StereoWidth {
        &self.stereo_width
    }

    pub fn output_gain(&self) -> f32 {
        self.output_gain.gain()
    }

    pub fn band(&self, kind: BandKind) -> &EqBand {
        match kind {
            BandKind::LowShelf => &self.low_shelf,
            BandKind::Peaking => &self.mid_peak,
            BandKind::HighShelf => &self.high_shelf,
        }
    }
}
