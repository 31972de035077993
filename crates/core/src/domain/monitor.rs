//! Monitor routing between original, mastered and reference playback
//!
//! The router owns a single live-path slot. Starting a path replaces
//! whatever occupied the slot, so two paths can never feed the sink at the
//! same time. Every switch is applied as one topology diff.

use crate::domain::audio::{AudioBuffer, AudioError, Result};
use crate::domain::chain::{ChainTopology, GraphTopology, SignalChain, TopologyDiff};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Which signal is being auditioned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorMode {
    #[default]
    Original,
    Mastered,
    Reference,
}

impl fmt::Display for MonitorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorMode::Original => f.write_str("original"),
            MonitorMode::Mastered => f.write_str("mastered"),
            MonitorMode::Reference => f.write_str("reference"),
        }
    }
}

impl std::str::FromStr for MonitorMode {
    type Err = AudioError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "original" => Ok(MonitorMode::Original),
            "mastered" => Ok(MonitorMode::Mastered),
            "reference" => Ok(MonitorMode::Reference),
            other => Err(AudioError::InvalidConfiguration(format!(
                "unknown monitor mode '{other}'"
            ))),
        }
    }
}

/// Playback state as seen from outside the router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    Stopped,
    Playing(MonitorMode),
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing(_))
    }
}

/// Audio feeding the live path
#[derive(Debug, Clone)]
pub enum PathSource {
    /// Source buffer straight to the sink
    Original(Arc<AudioBuffer>),
    /// Source buffer through the signal chain
    Mastered(Arc<AudioBuffer>),
    /// Reference buffer through the loudness-correction gain
    Reference { buffer: Arc<AudioBuffer>, gain: f32 },
}

impl PathSource {
    pub fn mode(&self) -> MonitorMode {
        match self {
            PathSource::Original(_) => MonitorMode::Original,
            PathSource::Mastered(_) => MonitorMode::Mastered,
            PathSource::Reference { .. } => MonitorMode::Reference,
        }
    }

    fn buffer(&self) -> &AudioBuffer {
        match self {
            PathSource::Original(buffer) | PathSource::Mastered(buffer) => buffer,
            PathSource::Reference { buffer, .. } => buffer,
        }
    }
}

#[derive(Debug)]
struct LivePath {
    source: PathSource,
    position: usize,
}

/// Routes exactly zero or one path to the monitoring sink
#[derive(Debug)]
pub struct MonitorRouter {
    live: Option<LivePath>,
    graph: GraphTopology,
    sink_channels: usize,
    scratch: Vec<f32>,
}

impl MonitorRouter {
    /// Create a stopped router feeding a sink with `sink_channels` channels
    pub fn new(sink_channels: usize) -> Result<Self> {
        if !(1..=2).contains(&sink_channels) {
            return Err(AudioError::InvalidConfiguration(format!(
                "monitor sink needs 1 or 2 channels, got {sink_channels}"
            )));
        }

        Ok(Self {
            live: None,
            graph: GraphTopology::stopped(),
            sink_channels,
            scratch: Vec::new(),
        })
    }

    pub fn sink_channels(&self) -> usize {
        self.sink_channels
    }

    pub fn state(&self) -> PlaybackState {
        match &self.live {
            Some(path) => PlaybackState::Playing(path.source.mode()),
            None => PlaybackState::Stopped,
        }
    }

    /// Number of paths connected to the sink (0 or 1)
    pub fn live_paths(&self) -> usize {
        self.graph.output_connections()
    }

    pub fn graph(&self) -> &GraphTopology {
        &self.graph
    }

    /// Current play position of the live path in frames
    pub fn position(&self) -> Option<usize> {
        self.live.as_ref().map(|path| path.position)
    }

    fn swap_graph(&mut self, next: GraphTopology) -> TopologyDiff {
        let diff = self.graph.diff(&next);
        if !diff.is_empty() {
            debug!(
                disconnect = diff.disconnect.len(),
                connect = diff.connect.len(),
                "Applying monitor topology"
            );
        }
        self.graph = next;
        diff
    }

    /// Start `source` from position 0, replacing any live path
    pub fn play(&mut self, source: PathSource, chain: ChainTopology) -> TopologyDiff {
        let mode = source.mode();
        let diff = self.swap_graph(GraphTopology::derive(chain, Some(mode)));
        self.live = Some(LivePath {
            source,
            position: 0,
        });
        debug!("Monitoring {}", mode);
        diff
    }

    /// Re-derive the live graph after a chain layout change, keeping position
    pub fn rewire(&mut self, chain: ChainTopology) -> TopologyDiff {
        let mode = self.live.as_ref().map(|path| path.source.mode());
        self.swap_graph(GraphTopology::derive(chain, mode))
    }

    /// Replace the buffer of a live mastered path, keeping its position
    pub fn retarget(&mut self, source: PathSource, chain: ChainTopology) -> TopologyDiff {
        match self.live.take() {
            Some(path) if path.source.mode() == source.mode() => {
                self.live = Some(LivePath {
                    source,
                    position: path.position,
                });
                self.rewire(chain)
            }
            _ => self.play(source, chain),
        }
    }

    /// Disconnect the live path; a no-op when nothing is playing
    pub fn stop(&mut self) {
        if let Some(path) = self.live.take() {
            debug!("Stopped {} monitoring", path.source.mode());
        }
        self.swap_graph(GraphTopology::stopped());
    }

    /// Render the next block of the live path into `out`
    ///
    /// `out` is interleaved with the sink's channel count. Returns the number
    /// of frames written; 0 means nothing is playing. Reaching the end of the
    /// buffer stops playback.
    pub fn pull(&mut self, chain: &mut SignalChain, out: &mut [f32]) -> Result<usize> {
        let sink_channels = self.sink_channels;
        let Some(path) = self.live.as_mut() else {
            return Ok(0);
        };

        let buffer = path.source.buffer();
        let channels = buffer.num_channels();
        let wanted = out.len() / sink_channels;

        self.scratch.resize(wanted * channels, 0.0);
        let frames = buffer.read_interleaved(path.position, &mut self.scratch);
        let block = &mut self.scratch[..frames * channels];

        match &path.source {
            PathSource::Original(_) => {}
            PathSource::Mastered(_) => chain.process(block)?,
            PathSource::Reference { gain, .. } => {
                for sample in block.iter_mut() {
                    *sample *= gain;
                }
            }
        }

        for (src, dst) in block
            .chunks_exact(channels)
            .zip(out.chunks_exact_mut(sink_channels))
        {
            match (channels, sink_channels) {
                (1, _) => dst.fill(src[0]),
                (2, 1) => dst[0] = 0.5 * (src[0] + src[1]),
                _ => dst.copy_from_slice(src),
            }
        }

        path.position += frames;
        trace!("Pulled {} monitor frames", frames);

        if frames < wanted {
            self.stop();
        }

        Ok(frames)
    }
}
