//! Audio file decoding using Symphonia
//!
//! Supports WAV, MP3, FLAC and OGG/Vorbis. Output is an `AudioBuffer` with
//! one or two channels; anything wider is downmixed to stereo.

use masterchain_core::domain::audio::{AudioBuffer, AudioError, Result};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info, warn};

/// -3 dB coefficient for center and surround channels
const CENTER_MIX: f32 = 0.707;

/// Decode an audio file from disk
pub fn decode_file(path: &Path) -> Result<AudioBuffer> {
    let file = std::fs::File::open(path)
        .map_err(|e| AudioError::DecodeFailure(format!("{}: {}", path.display(), e)))?;

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let buffer = decode_source(Box::new(file), hint)?;
    info!(
        path = %path.display(),
        frames = buffer.frames(),
        sample_rate = buffer.sample_rate(),
        channels = buffer.num_channels(),
        "Decoded file"
    );
    Ok(buffer)
}

/// Decode an in-memory encoded file
///
/// `extension` (e.g. `"wav"`) helps the format probe but is optional.
pub fn decode_bytes(bytes: Vec<u8>, extension: Option<&str>) -> Result<AudioBuffer> {
    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    decode_source(Box::new(Cursor::new(bytes)), hint)
}

/// Decode a file on Tokio's blocking pool
pub async fn decode_file_async(path: PathBuf) -> Result<AudioBuffer> {
    tokio::task::spawn_blocking(move || decode_file(&path))
        .await
        .map_err(|e| AudioError::DecodeFailure(format!("decode task failed: {e}")))?
}

fn decode_source(source: Box<dyn MediaSource>, hint: Hint) -> Result<AudioBuffer> {
    let mss = MediaSourceStream::new(source, Default::default());

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| AudioError::DecodeFailure(format!("Failed to probe audio: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| AudioError::DecodeFailure("No audio tracks found".to_string()))?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| AudioError::DecodeFailure("Unknown sample rate".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AudioError::DecodeFailure(format!("Failed to create decoder: {}", e)))?;

    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut channels = 0;
    let mut interleaved = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => {
                return Err(AudioError::DecodeFailure(format!(
                    "Error reading packet: {}",
                    e
                )));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Skipping corrupt packet: {}", e);
                continue;
            }
            Err(e) => {
                return Err(AudioError::DecodeFailure(format!("Decode error: {}", e)));
            }
        };

        let buf = sample_buf.get_or_insert_with(|| {
            let spec = *decoded.spec();
            channels = spec.channels.count();
            SampleBuffer::new(decoded.capacity() as u64, spec)
        });
        buf.copy_interleaved_ref(decoded);
        interleaved.extend_from_slice(buf.samples());
    }

    if channels == 0 {
        return Err(AudioError::DecodeFailure("No audio frames decoded".to_string()));
    }

    debug!(channels, sample_rate, samples = interleaved.len(), "Decode finished");

    AudioBuffer::new(sample_rate, to_planar(&interleaved, channels))
}

/// Split interleaved samples into one or two planar channels
///
/// Wider layouts fold center, LFE and surrounds into left/right at -3 dB,
/// assuming the usual L, R, C, LFE, SL, SR ordering.
fn to_planar(interleaved: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let frames = interleaved.len() / channels;

    match channels {
        1 => vec![interleaved.to_vec()],
        2 => {
            let mut left = Vec::with_capacity(frames);
            let mut right = Vec::with_capacity(frames);
            for frame in interleaved.chunks_exact(2) {
                left.push(frame[0]);
                right.push(frame[1]);
            }
            vec![left, right]
        }
        _ => {
            let mut left = Vec::with_capacity(frames);
            let mut right = Vec::with_capacity(frames);
            for frame in interleaved.chunks_exact(channels) {
                let (l, r) = downmix_frame(frame);
                left.push(l.clamp(-1.0, 1.0));
                right.push(r.clamp(-1.0, 1.0));
            }
            vec![left, right]
        }
    }
}

fn downmix_frame(frame: &[f32]) -> (f32, f32) {
    let (l, r) = (frame[0], frame[1]);
    match frame.len() {
        3 => {
            let c = frame[2] * CENTER_MIX;
            (l + c, r + c)
        }
        4 => (l + frame[2] * CENTER_MIX, r + frame[3] * CENTER_MIX),
        5 => {
            let c = frame[2] * CENTER_MIX;
            (l + c + frame[3] * CENTER_MIX, r + c + frame[4] * CENTER_MIX)
        }
        _ => {
            let common = (frame[2] + frame[3]) * CENTER_MIX;
            (l + common + frame[4] * CENTER_MIX, r + common + frame[5] * CENTER_MIX)
        }
    }
}
