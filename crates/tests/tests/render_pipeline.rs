//! Offline render pipeline tests
//!
//! Covers the full path from a loaded source through the chain to encoded
//! WAV bytes, and the stage-bypass equivalences the chain guarantees.

use masterchain_core::domain::audio::AudioBuffer;
use masterchain_core::domain::config::EngineConfig;
use masterchain_core::domain::dsp::{db_to_gain, SaturationParams, StereoWidthParams};
use masterchain_core::domain::engine::MasteringEngine;
use masterchain_core::domain::preset::{MasteringPreset, PresetCatalog};
use masterchain_core::domain::render::{NoProgress, OfflineRenderer};
use masterchain_core::domain::wav;
use masterchain_tests::{generate_sine_wave, tone_buffer, wide_stereo_buffer, SAMPLE_RATE};
use std::io::Cursor;

fn preset(id: &str) -> MasteringPreset {
    PresetCatalog::builtin().get(id).unwrap().clone()
}

fn render(source: &AudioBuffer, preset: &MasteringPreset) -> AudioBuffer {
    OfflineRenderer::default()
        .render(source, preset, &mut NoProgress)
        .unwrap()
}

// ============================================================================
// END-TO-END
// ============================================================================

#[test]
fn test_clean_render_of_mono_tone() {
    let source = tone_buffer(1, SAMPLE_RATE, 2 * SAMPLE_RATE as usize, 0.25);

    let mut engine = MasteringEngine::new(&EngineConfig::default()).unwrap();
    engine.load_source(source.clone());
    engine.apply_preset_id("clean").unwrap();

    let rendered = engine.render(&mut NoProgress).unwrap();

    assert_eq!(rendered.frames(), source.frames());
    assert_eq!(rendered.sample_rate(), SAMPLE_RATE);
    assert_eq!(rendered.num_channels(), 1);
    assert!(rendered.peak() <= 1.0);
    assert!(rendered.peak() > 0.0);
}

/// Full-scale 440 Hz mono tone with a 50 ms linear fade-in
fn full_scale_tone(frames: usize) -> AudioBuffer {
    let fade = SAMPLE_RATE as usize / 20;
    let mut wave = generate_sine_wave(440.0, SAMPLE_RATE, frames, 1.0);
    for (i, sample) in wave.iter_mut().take(fade).enumerate() {
        *sample *= i as f32 / fade as f32;
    }
    AudioBuffer::new(SAMPLE_RATE, vec![wave]).unwrap()
}

fn peak_from(buffer: &AudioBuffer, start: usize) -> f32 {
    buffer.channel(0).unwrap()[start..]
        .iter()
        .fold(0.0f32, |peak, s| peak.max(s.abs()))
}

#[test]
fn test_limiter_holds_full_scale_tone_at_ceiling() {
    let frames = 3 * SAMPLE_RATE as usize / 2;
    let settled = SAMPLE_RATE as usize;
    let source = full_scale_tone(frames);

    // Unity output gain and a 1:1 compressor leave the limiter as the only
    // stage that can pull the level down.
    let mut limited = preset("clean");
    limited.compression.ratio = 1.0;
    limited.output_gain = 1.0;

    let mut open = limited.clone();
    open.limiter.threshold_db = 20.0;

    let rendered = render(&source, &limited);
    let ceiling = db_to_gain(limited.limiter.threshold_db);

    assert!(rendered.peak() <= 1.0, "peak {}", rendered.peak());
    let settled_peak = peak_from(&rendered, settled);
    assert!(
        (settled_peak - ceiling).abs() < 0.05,
        "settled peak {settled_peak} vs ceiling {ceiling}"
    );

    let unlimited = render(&source, &open);
    let unlimited_peak = peak_from(&unlimited, settled);
    assert!(unlimited_peak > 1.0 - 0.05);
    assert!(unlimited_peak > settled_peak + 0.05);
}

#[test]
fn test_every_builtin_renders_stereo() {
    let source = wide_stereo_buffer(SAMPLE_RATE, 8192);

    for preset in PresetCatalog::builtin().iter() {
        let rendered = render(&source, preset);
        assert_eq!(rendered.frames(), source.frames(), "preset {}", preset.id);
        assert!(
            rendered.interleaved().iter().all(|s| s.is_finite()),
            "preset {} produced non-finite samples",
            preset.id
        );
    }
}

#[test]
fn test_render_is_deterministic() {
    let source = wide_stereo_buffer(SAMPLE_RATE, 4096);
    let warm = preset("warm");

    assert_eq!(render(&source, &warm), render(&source, &warm));
}

#[test]
fn test_exported_wav_is_readable() {
    let source = tone_buffer(1, SAMPLE_RATE, 2 * SAMPLE_RATE as usize, 0.25);

    let mut engine = MasteringEngine::new(&EngineConfig::default()).unwrap();
    engine.load_source(source);
    engine.apply_preset_id("clean").unwrap();
    let bytes = engine.export_wav(&mut NoProgress).unwrap();

    let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, SAMPLE_RATE);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(spec.sample_format, hound::SampleFormat::Int);
    assert_eq!(reader.len(), 2 * SAMPLE_RATE);
}

#[test]
fn test_wav_round_trip_through_hound() {
    let source = wide_stereo_buffer(SAMPLE_RATE, 1000);
    let bytes = wav::encode(&source).unwrap();
    assert_eq!(bytes.len(), 44 + 1000 * 2 * 2);

    let mut reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
    assert_eq!(reader.spec().channels, 2);
    assert_eq!(reader.spec().sample_rate, SAMPLE_RATE);

    let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    let original = source.interleaved();
    assert_eq!(decoded.len(), original.len());

    for (q, s) in decoded.iter().zip(&original) {
        let restored = *q as f32 / 32768.0;
        assert!((restored - s).abs() <= 1.0 / 32768.0 + 1e-6);
    }
}

// ============================================================================
// BYPASS EQUIVALENCES
// ============================================================================

#[test]
fn test_unit_width_matches_disabled_width() {
    let source = wide_stereo_buffer(SAMPLE_RATE, 4096);

    let mut disabled = preset("modern");
    disabled.stereo_width = Some(StereoWidthParams {
        enabled: false,
        width: 1.0,
    });
    let mut unit = disabled.clone();
    unit.stereo_width = Some(StereoWidthParams {
        enabled: true,
        width: 1.0,
    });

    let a = render(&source, &disabled).interleaved();
    let b = render(&source, &unit).interleaved();
    for (x, y) in a.iter().zip(&b) {
        assert!((x - y).abs() < 1e-5);
    }
}

#[test]
fn test_mono_ignores_width() {
    let source = tone_buffer(1, SAMPLE_RATE, 4096, 0.5);

    let wide = preset("modern");
    let mut narrow = wide.clone();
    narrow.stereo_width = None;

    assert_eq!(render(&source, &wide), render(&source, &narrow));
}

#[test]
fn test_zero_drive_matches_disabled_saturation() {
    let source = wide_stereo_buffer(SAMPLE_RATE, 4096);

    let mut off = preset("warm");
    off.saturation = Some(SaturationParams {
        enabled: false,
        drive: 15.0,
    });
    let mut zero = off.clone();
    zero.saturation = Some(SaturationParams {
        enabled: true,
        drive: 0.0,
    });

    assert_eq!(render(&source, &off), render(&source, &zero));
}

#[test]
fn test_saturation_changes_output() {
    let source = wide_stereo_buffer(SAMPLE_RATE, 4096);

    let warm = preset("warm");
    let mut dry = warm.clone();
    dry.saturation = None;

    assert_ne!(render(&source, &warm), render(&source, &dry));
}
