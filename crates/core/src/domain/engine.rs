//! Mastering engine handle
//!
//! One engine owns the chain state, the live signal chain and the monitor
//! router. Structural operations take `&mut self`, so callers serialize them
//! by construction; offline renders run on their own chain instances and only
//! share the engine's render slot.

use crate::domain::audio::{AudioBuffer, AudioError, BufferMetadata, ChannelCount, Result};
use crate::domain::chain::{GraphTopology, SignalChain};
use crate::domain::config::EngineConfig;
use crate::domain::dsp::resample_buffer;
use crate::domain::loudness::LoudnessMatcher;
use crate::domain::monitor::{MonitorMode, MonitorRouter, PathSource, PlaybackState};
use crate::domain::preset::{MasteringPreset, PresetCatalog};
use crate::domain::render::{NoProgress, OfflineRenderer, ProgressSink, RenderJob, RenderTicket};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{debug, info};

/// Sample rate the chain is built for before any source is loaded
const IDLE_SAMPLE_RATE: u32 = 44100;

/// Mutable per-engine state
#[derive(Debug, Default)]
pub struct ChainState {
    source: Option<Arc<AudioBuffer>>,
    reference: Option<Arc<AudioBuffer>>,
    // Reference converted to the source rate, built on first reference play
    aligned_reference: Option<Arc<AudioBuffer>>,
    preset: Option<MasteringPreset>,
    mode: MonitorMode,
    loudness: LoudnessMatcher,
}

impl ChainState {
    pub fn source(&self) -> Option<&Arc<AudioBuffer>> {
        self.source.as_ref()
    }

    pub fn reference(&self) -> Option<&Arc<AudioBuffer>> {
        self.reference.as_ref()
    }

    pub fn preset(&self) -> Option<&MasteringPreset> {
        self.preset.as_ref()
    }

    pub fn mode(&self) -> MonitorMode {
        self.mode
    }

    pub fn loudness_matching(&self) -> bool {
        self.loudness.is_enabled()
    }

    pub fn reference_gain(&self) -> f32 {
        self.loudness.correction()
    }

    fn recompute_loudness(&mut self) -> f32 {
        self.loudness
            .recompute(self.source.as_deref(), self.reference.as_deref())
    }
}

/// Structural engine operations as data
#[derive(Debug, Clone)]
pub enum Command {
    LoadSource { buffer: Arc<AudioBuffer> },
    LoadReference { buffer: Arc<AudioBuffer> },
    ClearReference,
    ApplyPreset { id: String },
    SetLoudnessMatching { enabled: bool },
    Play { mode: MonitorMode },
    Pause,
    Export,
}

impl Command {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Command::LoadSource { .. } => "load-source",
            Command::LoadReference { .. } => "load-reference",
            Command::ClearReference => "clear-reference",
            Command::ApplyPreset { .. } => "apply-preset",
            Command::SetLoudnessMatching { .. } => "set-loudness-matching",
            Command::Play { .. } => "play",
            Command::Pause => "pause",
            Command::Export => "export",
        }
    }
}

/// Result of command execution
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    SourceLoaded { metadata: BufferMetadata },
    ReferenceLoaded { metadata: BufferMetadata, correction: f32 },
    ReferenceCleared,
    PresetApplied { id: String },
    LoudnessMatchingChanged { enabled: bool, correction: f32 },
    Playing { mode: MonitorMode },
    Paused,
    Exported { bytes: Vec<u8> },
    Error(String),
}

/// Trait for asynchronous command execution
#[async_trait::async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command: Command) -> CommandResult;
}

/// The engine handle
#[derive(Debug)]
pub struct MasteringEngine {
    state: ChainState,
    chain: SignalChain,
    router: MonitorRouter,
    catalog: PresetCatalog,
    renderer: OfflineRenderer,
    monitor_block_size: usize,
    render_slot: Arc<AtomicBool>,
}

impl MasteringEngine {
    /// Create an engine with the built-in preset catalog
    pub fn new(config: &EngineConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| AudioError::InvalidConfiguration(e.to_string()))?;

        let engine = Self {
            state: ChainState {
                loudness: LoudnessMatcher::new(config.loudness.match_by_default),
                ..ChainState::default()
            },
            chain: SignalChain::new(IDLE_SAMPLE_RATE, ChannelCount::Stereo),
            router: MonitorRouter::new(config.monitor.channels)?,
            catalog: PresetCatalog::builtin(),
            renderer: OfflineRenderer::new(config.render.block_size)?,
            monitor_block_size: config.monitor.block_size,
            render_slot: Arc::new(AtomicBool::new(false)),
        };

        info!("Mastering engine created");
        Ok(engine)
    }

    /// Replace the preset catalog
    pub fn with_catalog(mut self, catalog: PresetCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Swap in a reloaded catalog; the applied preset is kept as is
    pub fn set_catalog(&mut self, catalog: PresetCatalog) {
        debug!(presets = catalog.len(), "Preset catalog replaced");
        self.catalog = catalog;
    }

    pub fn catalog(&self) -> &PresetCatalog {
        &self.catalog
    }

    pub fn state(&self) -> &ChainState {
        &self.state
    }

    pub fn chain(&self) -> &SignalChain {
        &self.chain
    }

    // ------------------------------------------------------------------------
    // Buffers
    // ------------------------------------------------------------------------

    /// Replace the source buffer; playback stops first
    pub fn load_source(&mut self, buffer: impl Into<Arc<AudioBuffer>>) -> BufferMetadata {
        let buffer = buffer.into();
        self.pause();

        self.chain.set_sample_rate(buffer.sample_rate());
        self.chain.rewire(buffer.channel_count());
        self.chain.reset();

        let metadata = buffer.metadata();
        self.state.source = Some(buffer);
        self.state.aligned_reference = None;
        self.state.recompute_loudness();

        info!(
            duration_secs = metadata.duration_secs,
            sample_rate = metadata.sample_rate,
            channels = metadata.channels,
            "Source loaded"
        );
        metadata
    }

    /// Replace the reference buffer
    pub fn load_reference(&mut self, buffer: impl Into<Arc<AudioBuffer>>) -> BufferMetadata {
        let buffer = buffer.into();
        if self.router.state() == PlaybackState::Playing(MonitorMode::Reference) {
            self.pause();
        }

        let metadata = buffer.metadata();
        self.state.reference = Some(buffer);
        self.state.aligned_reference = None;
        self.state.recompute_loudness();

        info!(
            duration_secs = metadata.duration_secs,
            sample_rate = metadata.sample_rate,
            "Reference loaded"
        );
        metadata
    }

    /// Drop the reference; reference monitoring falls back to mastered
    pub fn clear_reference(&mut self) {
        if self.router.state() == PlaybackState::Playing(MonitorMode::Reference) {
            self.pause();
        }
        if self.state.mode == MonitorMode::Reference {
            self.state.mode = MonitorMode::Mastered;
        }

        self.state.reference = None;
        self.state.aligned_reference = None;
        self.state.recompute_loudness();
        debug!("Reference cleared");
    }

    pub fn has_reference(&self) -> bool {
        self.state.reference.is_some()
    }

    pub fn source_metadata(&self) -> Option<BufferMetadata> {
        self.state.source.as_ref().map(|b| b.metadata())
    }

    pub fn reference_metadata(&self) -> Option<BufferMetadata> {
        self.state.reference.as_ref().map(|b| b.metadata())
    }

    // ------------------------------------------------------------------------
    // Presets and loudness
    // ------------------------------------------------------------------------

    /// Push a preset to the chain
    ///
    /// A live mastered path is rewired in place and keeps its position.
    pub fn apply_preset(&mut self, preset: MasteringPreset) -> Result<()> {
        if self.state.source.is_none() {
            return Err(AudioError::NoSourceLoaded);
        }

        let rewired = self.chain.apply_preset(&preset);
        if rewired && self.router.state() == PlaybackState::Playing(MonitorMode::Mastered) {
            self.router.rewire(self.chain.topology());
        }

        info!(preset = %preset.id, rewired, "Preset applied");
        self.state.preset = Some(preset);

        if self.state.loudness.is_enabled() {
            self.state.recompute_loudness();
        }
        Ok(())
    }

    /// Look up a preset in the catalog and apply it
    pub fn apply_preset_id(&mut self, id: &str) -> Result<()> {
        let preset = self.catalog.get(id)?.clone();
        self.apply_preset(preset)
    }

    pub fn preset(&self) -> Option<&MasteringPreset> {
        self.state.preset.as_ref()
    }

    /// Toggle loudness matching; a live reference path picks up the new gain
    pub fn set_loudness_matching(&mut self, enabled: bool) -> f32 {
        self.state.loudness.set_enabled(enabled);
        let correction = self.state.recompute_loudness();

        if self.router.state() == PlaybackState::Playing(MonitorMode::Reference) {
            if let Some(buffer) = self.state.aligned_reference.clone() {
                self.router.retarget(
                    PathSource::Reference {
                        buffer,
                        gain: correction,
                    },
                    self.chain.topology(),
                );
            }
        }

        correction
    }

    pub fn loudness_matching(&self) -> bool {
        self.state.loudness.is_enabled()
    }

    /// Gain applied on the reference path
    pub fn loudness_correction(&self) -> f32 {
        self.state.loudness.correction()
    }

    // ------------------------------------------------------------------------
    // Monitoring
    // ------------------------------------------------------------------------

    fn aligned_reference(&mut self, source_rate: u32) -> Result<Arc<AudioBuffer>> {
        if let Some(aligned) = &self.state.aligned_reference {
            return Ok(Arc::clone(aligned));
        }

        let reference = self
            .state
            .reference
            .as_ref()
            .ok_or(AudioError::NoReferenceLoaded)?;

        let aligned = if reference.sample_rate() == source_rate {
            Arc::clone(reference)
        } else {
            debug!(
                from = reference.sample_rate(),
                to = source_rate,
                "Resampling reference to source rate"
            );
            Arc::new(resample_buffer(reference, source_rate)?)
        };

        self.state.aligned_reference = Some(Arc::clone(&aligned));
        Ok(aligned)
    }

    /// Start monitoring `mode` from the beginning
    pub fn play(&mut self, mode: MonitorMode) -> Result<()> {
        let source = self
            .state
            .source
            .clone()
            .ok_or(AudioError::NoSourceLoaded)?;
        if mode == MonitorMode::Reference && self.state.reference.is_none() {
            return Err(AudioError::NoReferenceLoaded);
        }

        self.router.stop();

        let path = match mode {
            MonitorMode::Original => PathSource::Original(source),
            MonitorMode::Mastered => {
                self.chain.reset();
                PathSource::Mastered(source)
            }
            MonitorMode::Reference => PathSource::Reference {
                buffer: self.aligned_reference(source.sample_rate())?,
                gain: self.state.loudness.correction(),
            },
        };

        self.router.play(path, self.chain.topology());
        self.state.mode = mode;
        Ok(())
    }

    /// Stop monitoring; always safe to call
    pub fn pause(&mut self) {
        self.router.stop();
    }

    /// Render the next interleaved monitor block into `out`
    ///
    /// Returns the number of frames written; 0 when stopped.
    pub fn pull_monitor(&mut self, out: &mut [f32]) -> Result<usize> {
        self.router.pull(&mut self.chain, out)
    }

    /// Pull one block of `monitor_block_size` frames
    ///
    /// The returned samples are interleaved for the sink and trimmed to the
    /// frames actually rendered; an empty block means nothing is playing.
    pub fn pull_monitor_block(&mut self) -> Result<Vec<f32>> {
        let channels = self.monitor_channels();
        let mut block = vec![0.0; self.monitor_block_size * channels];
        let frames = self.pull_monitor(&mut block)?;
        block.truncate(frames * channels);
        Ok(block)
    }

    /// Frame position of the live path, `None` when stopped
    pub fn play_position(&self) -> Option<usize> {
        self.router.position()
    }

    pub fn monitor_channels(&self) -> usize {
        self.router.sink_channels()
    }

    pub fn monitor_block_size(&self) -> usize {
        self.monitor_block_size
    }

    pub fn mode(&self) -> MonitorMode {
        self.state.mode
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.router.state()
    }

    /// Paths currently connected to the sink (0 or 1)
    pub fn live_paths(&self) -> usize {
        self.router.live_paths()
    }

    pub fn graph(&self) -> &GraphTopology {
        self.router.graph()
    }

    // ------------------------------------------------------------------------
    // Offline rendering
    // ------------------------------------------------------------------------

    /// Snapshot the source and preset into a job holding the render slot
    ///
    /// Fails with `RenderFailure` while another job from this engine is alive.
    pub fn render_job(&self) -> Result<RenderJob> {
        let source = self
            .state
            .source
            .clone()
            .ok_or(AudioError::NoSourceLoaded)?;
        let preset = self
            .state
            .preset
            .clone()
            .ok_or_else(|| AudioError::RenderFailure("no preset applied".into()))?;
        let ticket = RenderTicket::acquire(&self.render_slot)?;

        Ok(RenderJob::new(source, preset, self.renderer, ticket))
    }

    /// Render the source with the current preset
    pub fn render(&self, progress: &mut dyn ProgressSink) -> Result<AudioBuffer> {
        self.render_job()?.render(progress)
    }

    /// Render and encode the source with the current preset
    pub fn export_wav(&self, progress: &mut dyn ProgressSink) -> Result<Vec<u8>> {
        self.render_job()?.export_wav(progress)
    }

    // ------------------------------------------------------------------------
    // Commands and lifecycle
    // ------------------------------------------------------------------------

    /// Run one structural command
    pub fn execute(&mut self, command: Command) -> Result<CommandResult> {
        debug!(command = command.name(), "Executing command");

        let result = match command {
            Command::LoadSource { buffer } => CommandResult::SourceLoaded {
                metadata: self.load_source(buffer),
            },
            Command::LoadReference { buffer } => {
                let metadata = self.load_reference(buffer);
                CommandResult::ReferenceLoaded {
                    metadata,
                    correction: self.loudness_correction(),
                }
            }
            Command::ClearReference => {
                self.clear_reference();
                CommandResult::ReferenceCleared
            }
            Command::ApplyPreset { id } => {
                self.apply_preset_id(&id)?;
                CommandResult::PresetApplied { id }
            }
            Command::SetLoudnessMatching { enabled } => CommandResult::LoudnessMatchingChanged {
                enabled,
                correction: self.set_loudness_matching(enabled),
            },
            Command::Play { mode } => {
                self.play(mode)?;
                CommandResult::Playing { mode }
            }
            Command::Pause => {
                self.pause();
                CommandResult::Paused
            }
            Command::Export => CommandResult::Exported {
                bytes: self.export_wav(&mut NoProgress)?,
            },
        };

        Ok(result)
    }

    /// Stop playback and release the engine
    pub fn dispose(self) {
        drop(self);
    }
}

impl Drop for MasteringEngine {
    fn drop(&mut self) {
        self.router.stop();
        info!("Mastering engine disposed");
    }
}
