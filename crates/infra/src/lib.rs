//! Infrastructure around the mastering engine: file decoding, background
//! export and a shareable async engine handle.

pub mod audio;

pub use audio::*;
