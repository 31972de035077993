//! Audio I/O and task plumbing for the mastering engine
//!
//! - `decoder`: Symphonia-backed file decoding into `AudioBuffer`
//! - `render_task`: exports on Tokio's blocking pool with progress channels
//! - `shared`: an async, lock-protected engine implementing `CommandExecutor`,
//!   with user preset hot reload

pub mod decoder;
pub mod render_task;
pub mod shared;

pub use decoder::{decode_bytes, decode_file, decode_file_async};
pub use render_task::{spawn_export, spawn_render, ExportHandle};
pub use shared::{PresetWatch, SharedEngine};
