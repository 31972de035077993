//! Offline rendering of the mastering chain
//!
//! The renderer builds its own chain for every job, configured exactly like
//! the live mastered path, and processes the whole buffer in one pass.

use crate::domain::audio::{AudioBuffer, AudioError, Result};
use crate::domain::chain::SignalChain;
use crate::domain::preset::MasteringPreset;
use crate::domain::wav;
use crossbeam::channel::Sender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Progress checkpoints reported during a render
pub mod checkpoint {
    pub const STARTED: u8 = 10;
    pub const CHAIN_BUILT: u8 = 20;
    pub const PROCESSING: u8 = 40;
    pub const RENDERED: u8 = 70;
    pub const ENCODED: u8 = 100;
}

/// Receiver of render progress percentages
pub trait ProgressSink {
    fn report(&mut self, percent: u8);
}

impl<F: FnMut(u8)> ProgressSink for F {
    fn report(&mut self, percent: u8) {
        self(percent)
    }
}

/// Progress sink that discards every update
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _percent: u8) {}
}

/// Forwards progress over a channel; a dropped receiver is ignored
#[derive(Debug, Clone)]
pub struct ChannelProgress(pub Sender<u8>);

impl ProgressSink for ChannelProgress {
    fn report(&mut self, percent: u8) {
        let _ = self.0.send(percent);
    }
}

/// Wraps a sink so reported values never decrease and never exceed 100
struct Monotonic<'a> {
    inner: &'a mut dyn ProgressSink,
    last: u8,
}

impl<'a> Monotonic<'a> {
    fn new(inner: &'a mut dyn ProgressSink) -> Self {
        Self { inner, last: 0 }
    }

    fn report(&mut self, percent: u8) {
        let value = percent.min(100).max(self.last);
        self.last = value;
        self.inner.report(value);
    }
}

/// Guard marking a render as in flight on one engine
///
/// Only one ticket can exist per flag; dropping it frees the slot.
#[derive(Debug)]
pub struct RenderTicket {
    flag: Arc<AtomicBool>,
}

impl RenderTicket {
    pub fn acquire(flag: &Arc<AtomicBool>) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| AudioError::RenderFailure("render already in progress".into()))?;

        Ok(Self {
            flag: Arc::clone(flag),
        })
    }
}

impl Drop for RenderTicket {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Renders a buffer through a freshly built chain
#[derive(Debug, Clone, Copy)]
pub struct OfflineRenderer {
    block_size: usize,
}

impl OfflineRenderer {
    pub const DEFAULT_BLOCK_SIZE: usize = 1024;

    pub fn new(block_size: usize) -> Result<Self> {
        if block_size == 0 {
            return Err(AudioError::InvalidConfiguration(
                "render block size must be non-zero".into(),
            ));
        }
        Ok(Self { block_size })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    fn render_inner(
        &self,
        source: &AudioBuffer,
        preset: &MasteringPreset,
        progress: &mut Monotonic<'_>,
    ) -> Result<AudioBuffer> {
        progress.report(checkpoint::STARTED);

        let channels = source.channel_count();
        let mut chain = SignalChain::for_preset(source.sample_rate(), channels, preset);
        progress.report(checkpoint::CHAIN_BUILT);

        debug!(
            preset = %preset.id,
            frames = source.frames(),
            stages = chain.topology().stages().len(),
            "Offline chain built"
        );

        progress.report(checkpoint::PROCESSING);
        let rendered = chain
            .process_buffer(source, self.block_size)
            .map_err(|e| AudioError::RenderFailure(e.to_string()))?;
        progress.report(checkpoint::RENDERED);

        Ok(rendered)
    }

    /// Render `source` through a chain configured for `preset`
    ///
    /// The result has the same sample rate, channel count and length.
    pub fn render(
        &self,
        source: &AudioBuffer,
        preset: &MasteringPreset,
        progress: &mut dyn ProgressSink,
    ) -> Result<AudioBuffer> {
        let mut progress = Monotonic::new(progress);
        self.render_inner(source, preset, &mut progress)
    }

    /// Render and encode to WAV bytes, reporting 100 on success
    pub fn export_wav(
        &self,
        source: &AudioBuffer,
        preset: &MasteringPreset,
        progress: &mut dyn ProgressSink,
    ) -> Result<Vec<u8>> {
        let started = Instant::now();
        let mut progress = Monotonic::new(progress);

        let rendered = self.render_inner(source, preset, &mut progress)?;
        let bytes = wav::encode(&rendered)?;
        progress.report(checkpoint::ENCODED);

        info!(
            preset = %preset.id,
            bytes = bytes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Export finished"
        );
        Ok(bytes)
    }
}

impl Default for OfflineRenderer {
    fn default() -> Self {
        Self {
            block_size: Self::DEFAULT_BLOCK_SIZE,
        }
    }
}

/// Snapshot of everything a render needs, holding the engine's render slot
#[derive(Debug)]
pub struct RenderJob {
    source: Arc<AudioBuffer>,
    preset: MasteringPreset,
    renderer: OfflineRenderer,
    _ticket: RenderTicket,
}

impl RenderJob {
    pub fn new(
        source: Arc<AudioBuffer>,
        preset: MasteringPreset,
        renderer: OfflineRenderer,
        ticket: RenderTicket,
    ) -> Self {
        Self {
            source,
            preset,
            renderer,
            _ticket: ticket,
        }
    }

    pub fn preset(&self) -> &MasteringPreset {
        &self.preset
    }

    pub fn source(&self) -> &AudioBuffer {
        &self.source
    }

    /// Render only; the slot is released when the job is consumed
    pub fn render(self, progress: &mut dyn ProgressSink) -> Result<AudioBuffer> {
        info!(preset = %self.preset.id, "Render started");
        self.renderer.render(&self.source, &self.preset, progress)
    }

    /// Render and encode to WAV bytes
    pub fn export_wav(self, progress: &mut dyn ProgressSink) -> Result<Vec<u8>> {
        info!(preset = %self.preset.id, "Export started");
        self.renderer.export_wav(&self.source, &self.preset, progress)
    }
}
