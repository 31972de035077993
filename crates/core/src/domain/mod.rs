//! Domain entities and business rules

pub mod audio;
pub mod chain;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod loudness;
pub mod monitor;
pub mod preset;
pub mod render;
pub mod wav;

// Re-export specific items to avoid ambiguous glob imports
pub use audio::{AudioBuffer, AudioError, BufferMetadata, ChannelCount};
pub use chain::{ChainTopology, GraphTopology, SignalChain, StageId};
pub use config::{ConfigError, ConfigManager, ConfigWatcher, EngineConfig, PresetManager};
pub use engine::{ChainState, Command, CommandExecutor, CommandResult, MasteringEngine};
pub use loudness::{compute_correction, rms, LoudnessMatcher};
pub use monitor::{MonitorMode, MonitorRouter, PlaybackState};
pub use preset::{EqSettings, MasteringPreset, PresetCatalog};
pub use render::{ChannelProgress, NoProgress, OfflineRenderer, ProgressSink, RenderJob};
