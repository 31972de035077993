//! Background rendering
//!
//! A `RenderJob` is CPU bound, so it runs on Tokio's blocking pool. Progress
//! flows back through a crossbeam channel that callers may poll or drain.

use crossbeam::channel::{unbounded, Receiver};
use masterchain_core::domain::audio::{AudioBuffer, AudioError, Result};
use masterchain_core::domain::render::{ChannelProgress, RenderJob};
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// A render running in the background
#[derive(Debug)]
pub struct RenderHandle<T> {
    progress: Receiver<u8>,
    task: JoinHandle<Result<T>>,
}

/// Handle to a background WAV export
pub type ExportHandle = RenderHandle<Vec<u8>>;

impl<T> RenderHandle<T> {
    /// Progress updates, in percent
    pub fn progress(&self) -> &Receiver<u8> {
        &self.progress
    }

    /// Most recent progress value reported so far, if any
    pub fn latest_progress(&self) -> Option<u8> {
        self.progress.try_iter().last()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the render to finish
    pub async fn join(self) -> Result<T> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                error!("Render task failed: {}", e);
                Err(AudioError::RenderFailure(format!("render task failed: {e}")))
            }
        }
    }
}

fn spawn_with<T, F>(job: RenderJob, run: F) -> RenderHandle<T>
where
    T: Send + 'static,
    F: FnOnce(RenderJob, &mut ChannelProgress) -> Result<T> + Send + 'static,
{
    let (tx, rx) = unbounded();
    debug!(preset = %job.preset().id, "Spawning render task");

    let task = tokio::task::spawn_blocking(move || {
        let mut sink = ChannelProgress(tx);
        run(job, &mut sink)
    });

    RenderHandle { progress: rx, task }
}

/// Render and encode `job` to WAV bytes in the background
pub fn spawn_export(job: RenderJob) -> ExportHandle {
    spawn_with(job, |job, sink| job.export_wav(sink))
}

/// Render `job` in the background without encoding
pub fn spawn_render(job: RenderJob) -> RenderHandle<AudioBuffer> {
    spawn_with(job, |job, sink| job.render(sink))
}
