//! Shared signal generators for the integration tests

use masterchain_core::domain::audio::AudioBuffer;
use std::f32::consts::PI;

pub const SAMPLE_RATE: u32 = 44100;

pub fn generate_sine_wave(frequency: f32, sample_rate: u32, frames: usize, amplitude: f32) -> Vec<f32> {
    (0..frames)
        .map(|i| 2.0 * PI * frequency * i as f32 / sample_rate as f32)
        .map(|phase| amplitude * phase.sin())
        .collect()
}

/// Identical sine tone on every channel
pub fn tone_buffer(channels: usize, sample_rate: u32, frames: usize, amplitude: f32) -> AudioBuffer {
    let wave = generate_sine_wave(440.0, sample_rate, frames, amplitude);
    AudioBuffer::new(sample_rate, vec![wave; channels]).expect("valid tone buffer")
}

/// Stereo buffer with different content per side
pub fn wide_stereo_buffer(sample_rate: u32, frames: usize) -> AudioBuffer {
    let left = generate_sine_wave(220.0, sample_rate, frames, 0.4);
    let right = generate_sine_wave(330.0, sample_rate, frames, 0.3);
    AudioBuffer::new(sample_rate, vec![left, right]).expect("valid stereo buffer")
}
