//! Canonical 16-bit PCM WAV encoding
//!
//! Layout: a 44-byte RIFF header followed by frame-major interleaved
//! little-endian i16 samples.

use crate::domain::audio::{AudioBuffer, AudioError, Result};
use tracing::debug;

/// Size of the RIFF/fmt/data header in bytes
pub const HEADER_LEN: usize = 44;

/// Size of the fmt chunk body
pub const FMT_CHUNK_LEN: u32 = 16;

/// PCM format tag
pub const FORMAT_PCM: u16 = 1;

pub const BITS_PER_SAMPLE: u16 = 16;

const BYTES_PER_SAMPLE: usize = 2;

/// Quantize a float sample to signed 16-bit
///
/// Samples are clamped to [-1, 1]; negative values scale by 32768 and
/// positive values by 32767.
#[inline]
pub fn quantize(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0).round() as i16
    } else {
        (s * 32767.0).round() as i16
    }
}

/// Total encoded size for a buffer
pub fn encoded_len(buffer: &AudioBuffer) -> usize {
    HEADER_LEN + buffer.frames() * buffer.num_channels() * BYTES_PER_SAMPLE
}

/// Serialize a buffer into WAV bytes
///
/// Fails if the data would not fit the 32-bit RIFF size fields.
pub fn encode(buffer: &AudioBuffer) -> Result<Vec<u8>> {
    let channels = buffer.num_channels();
    let data_len = buffer.frames() * channels * BYTES_PER_SAMPLE;
    let riff_len = u32::try_from(data_len + HEADER_LEN - 8).map_err(|_| {
        AudioError::RenderFailure(format!("{data_len} bytes of audio exceed the WAV size limit"))
    })?;

    let channels_u16 = channels as u16;
    let sample_rate = buffer.sample_rate();
    let block_align = channels_u16 * BYTES_PER_SAMPLE as u16;
    let byte_rate = sample_rate * block_align as u32;

    let mut bytes = Vec::with_capacity(HEADER_LEN + data_len);

    // RIFF header
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&riff_len.to_le_bytes());
    bytes.extend_from_slice(b"WAVE");

    // fmt chunk
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&FMT_CHUNK_LEN.to_le_bytes());
    bytes.extend_from_slice(&FORMAT_PCM.to_le_bytes());
    bytes.extend_from_slice(&channels_u16.to_le_bytes());
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&byte_rate.to_le_bytes());
    bytes.extend_from_slice(&block_align.to_le_bytes());
    bytes.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    // data chunk
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&(data_len as u32).to_le_bytes());

    for frame in 0..buffer.frames() {
        for channel in buffer.channels() {
            bytes.extend_from_slice(&quantize(channel[frame]).to_le_bytes());
        }
    }

    debug!(
        bytes = bytes.len(),
        channels,
        sample_rate,
        "Encoded WAV"
    );
    Ok(bytes)
}
