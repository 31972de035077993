//! Configuration management for the mastering engine
//!
//! This module provides:
//! - Engine settings (render/monitor block sizes, loudness defaults)
//! - User preset storage as TOML files
//! - Hot-reload support via file system watcher

use crate::domain::preset::MasteringPreset;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("File watch error: {0}")]
    WatchError(#[from] notify::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Preset not found: {0}")]
    PresetNotFound(String),
}

/// Offline render settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Frames processed per chain call
    pub block_size: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self { block_size: 1024 }
    }
}

/// Monitoring sink settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Channel count of the monitoring sink
    pub channels: usize,

    /// Frames pulled per monitor block
    pub block_size: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            channels: 2,
            block_size: 512,
        }
    }
}

/// Loudness matching defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoudnessConfig {
    /// Whether a new engine starts with matching enabled
    pub match_by_default: bool,
}

/// Preset selection and storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresetConfig {
    /// Preset id used when none is given
    pub default_preset: String,

    /// Directory of user-defined preset files
    pub user_dir: Option<PathBuf>,
}

impl Default for PresetConfig {
    fn default() -> Self {
        Self {
            default_preset: "clean".to_string(),
            user_dir: None,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub render: RenderConfig,
    pub monitor: MonitorConfig,
    pub loudness: LoudnessConfig,
    pub presets: PresetConfig,
}

impl EngineConfig {
    /// Check values that would make the engine unusable
    pub fn validate(&self) -> Result<()> {
        if self.render.block_size == 0 {
            return Err(ConfigError::Invalid("render.block_size must be > 0".into()));
        }
        if self.monitor.block_size == 0 {
            return Err(ConfigError::Invalid("monitor.block_size must be > 0".into()));
        }
        if !(1..=2).contains(&self.monitor.channels) {
            return Err(ConfigError::Invalid(format!(
                "monitor.channels must be 1 or 2, got {}",
                self.monitor.channels
            )));
        }
        if self.presets.default_preset.is_empty() {
            return Err(ConfigError::Invalid("presets.default_preset is empty".into()));
        }
        Ok(())
    }

    /// Load configuration from TOML file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;

        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to TOML file
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving configuration");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        fs::write(path, toml_str).await?;

        debug!("Configuration saved successfully");
        Ok(())
    }
}

/// File system watcher for preset hot-reload
pub struct ConfigWatcher {
    _watcher: notify::RecommendedWatcher,
    change_tx: broadcast::Sender<PathBuf>,
}

impl ConfigWatcher {
    /// Watch `preset_dir` for created or modified `.toml` files
    pub async fn new(preset_dir: PathBuf) -> Result<Self> {
        use notify::Watcher;

        let (change_tx, _change_rx) = broadcast::channel(32);

        fs::create_dir_all(&preset_dir).await?;

        let tx_clone = change_tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                if matches!(
                    event.kind,
                    notify::EventKind::Create(_) | notify::EventKind::Modify(_)
                ) {
                    for path in event.paths {
                        if path.extension().and_then(|e| e.to_str()) == Some("toml") {
                            // No subscribers is fine
                            if tx_clone.send(path).is_err() {
                                debug!("Preset change with no subscribers");
                            }
                        }
                    }
                }
            }
        })?;

        watcher.watch(&preset_dir, notify::RecursiveMode::NonRecursive)?;

        info!(path = %preset_dir.display(), "Preset watcher started");

        Ok(Self {
            _watcher: watcher,
            change_tx,
        })
    }

    /// Subscribe to preset change events
    pub fn subscribe(&self) -> broadcast::Receiver<PathBuf> {
        self.change_tx.subscribe()
    }
}

/// Stores user-defined presets as `<id>.toml` files
pub struct PresetManager {
    preset_dir: PathBuf,
}

impl PresetManager {
    pub fn new(preset_dir: PathBuf) -> Self {
        Self { preset_dir }
    }

    pub fn preset_dir(&self) -> &Path {
        &self.preset_dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(ConfigError::Invalid(format!("invalid preset id '{id}'")));
        }
        Ok(self.preset_dir.join(format!("{}.toml", id)))
    }

    /// List ids of all stored presets
    #[instrument(skip(self))]
    pub async fn list_presets(&self) -> Result<Vec<String>> {
        let mut presets = Vec::new();

        let mut entries = fs::read_dir(&self.preset_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e == "toml").unwrap_or(false) {
                if let Some(name) = path.file_stem().and_then(|n| n.to_str()) {
                    presets.push(name.to_string());
                }
            }
        }

        presets.sort();
        debug!(count = presets.len(), "Listed presets");
        Ok(presets)
    }

    /// Load a preset by id
    #[instrument(skip(self))]
    pub async fn load_preset(&self, id: &str) -> Result<MasteringPreset> {
        let path = self.path_for(id)?;

        if !path.exists() {
            return Err(ConfigError::PresetNotFound(id.to_string()));
        }

        let contents = fs::read_to_string(&path).await?;
        let preset: MasteringPreset = toml::from_str(&contents)?;

        if preset.id != id {
            return Err(ConfigError::Invalid(format!(
                "preset file '{}' declares id '{}'",
                path.display(),
                preset.id
            )));
        }

        Ok(preset)
    }

    /// Load every stored preset, skipping unreadable files
    #[instrument(skip(self))]
    pub async fn load_all(&self) -> Result<Vec<MasteringPreset>> {
        let mut presets = Vec::new();

        for id in self.list_presets().await? {
            match self.load_preset(&id).await {
                Ok(preset) => presets.push(preset),
                Err(e) => warn!(id = %id, error = %e, "Skipping unreadable preset"),
            }
        }

        Ok(presets)
    }

    /// Save a preset under its own id
    #[instrument(skip(self, preset), fields(id = %preset.id))]
    pub async fn save_preset(&self, preset: &MasteringPreset) -> Result<()> {
        let path = self.path_for(&preset.id)?;
        fs::create_dir_all(&self.preset_dir).await?;

        let toml_str = toml::to_string_pretty(preset)?;
        fs::write(&path, toml_str).await?;

        debug!(path = %path.display(), "Preset saved");
        Ok(())
    }

    /// Delete a preset by id
    #[instrument(skip(self))]
    pub async fn delete_preset(&self, id: &str) -> Result<()> {
        let path = self.path_for(id)?;

        if !path.exists() {
            return Err(ConfigError::PresetNotFound(id.to_string()));
        }

        fs::remove_file(&path).await?;
        info!(id, "Preset deleted");
        Ok(())
    }

    /// Check if a preset exists
    pub async fn preset_exists(&self, id: &str) -> bool {
        self.path_for(id).map(|p| p.exists()).unwrap_or(false)
    }
}

/// Manages the main configuration file at `<config dir>/masterchain/config.toml`
pub struct ConfigManager {
    config_dir: PathBuf,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_path = config_dir.join("config.toml");

        Self {
            config_dir,
            config_path,
        }
    }

    /// Default config directory
    ///
    /// `~/.config/masterchain` on Linux, the platform equivalent elsewhere.
    pub fn default_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("masterchain"))
            .ok_or_else(|| ConfigError::Invalid("Could not determine config directory".to_string()))
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load configuration from file
    ///
    /// A missing file yields the default (written back for next time); a
    /// corrupt file is backed up as `config.toml.corrupt` and replaced by the
    /// default in memory.
    #[instrument(skip(self))]
    pub async fn load(&self) -> EngineConfig {
        if !self.config_path.exists() {
            info!(
                path = %self.config_path.display(),
                "Config file not found, creating default"
            );

            let config = EngineConfig::default();
            if let Err(e) = config.save_to_file(&self.config_path).await {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to save default config"
                );
            }

            return config;
        }

        match EngineConfig::load_from_file(&self.config_path).await {
            Ok(config) => config,
            Err(e) => {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to load config, using default"
                );

                let backup_path = self.config_path.with_extension("toml.corrupt");
                if let Err(copy_err) = fs::copy(&self.config_path, &backup_path).await {
                    error!(
                        path = %backup_path.display(),
                        error = %copy_err,
                        "Failed to backup corrupt config"
                    );
                }

                EngineConfig::default()
            }
        }
    }

    #[instrument(skip(self, config))]
    pub async fn save(&self, config: &EngineConfig) -> Result<()> {
        config.validate()?;
        fs::create_dir_all(&self.config_dir).await?;
        config.save_to_file(&self.config_path).await
    }

    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }
}
