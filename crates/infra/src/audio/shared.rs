//! Async engine handle
//!
//! Wraps a `MasteringEngine` in a Tokio mutex so UI or CLI tasks can drive it
//! with `Command`s. Exports take a job snapshot under the lock and render
//! after releasing it, so monitoring and preset changes stay responsive.
//! A preset watch reloads the user preset directory into the engine's catalog
//! whenever a `.toml` file there is created or modified.

use crate::audio::render_task::{spawn_export, ExportHandle};
use masterchain_core::domain::audio::Result;
use masterchain_core::domain::config::{self, ConfigWatcher, PresetManager};
use masterchain_core::domain::engine::{Command, CommandExecutor, CommandResult, MasteringEngine};
use masterchain_core::domain::preset::PresetCatalog;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SharedEngine {
    inner: Arc<Mutex<MasteringEngine>>,
}

impl SharedEngine {
    pub fn new(engine: MasteringEngine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    /// Exclusive access to the engine
    pub async fn lock(&self) -> MutexGuard<'_, MasteringEngine> {
        self.inner.lock().await
    }

    /// Start a background export of the current source and preset
    pub async fn export(&self) -> Result<ExportHandle> {
        let job = self.inner.lock().await.render_job()?;
        Ok(spawn_export(job))
    }

    /// Rebuild the catalog from the built-ins plus every preset `manager` holds
    ///
    /// Returns the number of user presets loaded.
    pub async fn reload_presets(&self, manager: &PresetManager) -> config::Result<usize> {
        let user = manager.load_all().await?;
        let count = user.len();
        let catalog = PresetCatalog::builtin().with_user_presets(user);

        self.inner.lock().await.set_catalog(catalog);
        info!(dir = %manager.preset_dir().display(), count, "User presets reloaded");
        Ok(count)
    }

    /// Load `dir` now and reload it on every preset file change
    ///
    /// Watching stops when the returned `PresetWatch` is dropped.
    pub async fn watch_presets(&self, dir: PathBuf) -> config::Result<PresetWatch> {
        let watcher = ConfigWatcher::new(dir.clone()).await?;
        let mut changes = watcher.subscribe();
        let manager = PresetManager::new(dir);
        self.reload_presets(&manager).await?;

        let engine = self.clone();
        let task = tokio::spawn(async move {
            let _watcher = watcher;
            loop {
                match changes.recv().await {
                    Ok(path) => {
                        debug!(path = %path.display(), "Preset file changed");
                        if let Err(e) = engine.reload_presets(&manager).await {
                            warn!("Preset reload failed: {}", e);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Preset change events coalesced");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Ok(PresetWatch { task })
    }
}

/// Background preset reload started by `SharedEngine::watch_presets`
#[derive(Debug)]
pub struct PresetWatch {
    task: JoinHandle<()>,
}

impl PresetWatch {
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for PresetWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[async_trait::async_trait]
impl CommandExecutor for SharedEngine {
    async fn execute(&self, command: Command) -> CommandResult {
        let name = command.name();

        let outcome = match command {
            Command::Export => match self.export().await {
                Ok(handle) => handle.join().await.map(|bytes| CommandResult::Exported { bytes }),
                Err(e) => Err(e),
            },
            other => self.inner.lock().await.execute(other),
        };

        match outcome {
            Ok(result) => {
                debug!(command = name, "Command completed");
                result
            }
            Err(e) => {
                warn!(command = name, "Command failed: {}", e);
                CommandResult::Error(e.to_string())
            }
        }
    }
}
