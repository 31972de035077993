//! Mastering signal-chain engine
//!
//! Decoded buffers go in, a preset configures the chain, and the result is
//! either auditioned through the monitor router or rendered offline to WAV.

pub mod domain;

pub use domain::*;
