//! Monitoring graph integration tests
//!
//! Only one path may ever feed the output, whatever sequence of mode
//! switches, preset changes and reloads the engine sees.

use masterchain_core::domain::audio::{AudioBuffer, AudioError};
use masterchain_core::domain::config::EngineConfig;
use masterchain_core::domain::engine::MasteringEngine;
use masterchain_core::domain::monitor::{MonitorMode, PlaybackState};
use masterchain_tests::{tone_buffer, wide_stereo_buffer, SAMPLE_RATE};

fn engine_with(source: AudioBuffer, reference: Option<AudioBuffer>) -> MasteringEngine {
    let mut engine = MasteringEngine::new(&EngineConfig::default()).unwrap();
    engine.load_source(source);
    if let Some(reference) = reference {
        engine.load_reference(reference);
    }
    engine.apply_preset_id("modern").unwrap();
    engine
}

fn assert_single_path(engine: &MasteringEngine) {
    assert_eq!(engine.live_paths(), 1);
    assert_eq!(engine.graph().output_connections(), 1);
}

#[test]
fn test_mode_switching_keeps_single_path() {
    let mut engine = engine_with(
        wide_stereo_buffer(SAMPLE_RATE, 44100),
        Some(tone_buffer(2, SAMPLE_RATE, 44100, 0.1)),
    );
    let mut block = vec![0.0; 512 * engine.monitor_channels()];

    let sequence = [
        MonitorMode::Original,
        MonitorMode::Mastered,
        MonitorMode::Reference,
        MonitorMode::Mastered,
        MonitorMode::Mastered,
        MonitorMode::Original,
        MonitorMode::Reference,
    ];

    for mode in sequence {
        engine.play(mode).unwrap();
        assert_eq!(engine.playback_state(), PlaybackState::Playing(mode));
        assert_single_path(&engine);

        assert_eq!(engine.pull_monitor(&mut block).unwrap(), 512);
        assert_single_path(&engine);
    }

    engine.pause();
    assert_eq!(engine.live_paths(), 0);
    assert!(engine.graph().is_empty());
}

#[test]
fn test_preset_switches_while_playing_keep_single_path() {
    let mut engine = engine_with(wide_stereo_buffer(SAMPLE_RATE, 44100), None);
    let mut block = vec![0.0; 256 * engine.monitor_channels()];

    engine.play(MonitorMode::Mastered).unwrap();
    for id in ["clean", "warm", "loud", "voiceClean", "modern"] {
        engine.apply_preset_id(id).unwrap();
        assert_single_path(&engine);
        engine.pull_monitor(&mut block).unwrap();
    }
}

#[test]
fn test_pause_is_idempotent() {
    let mut engine = engine_with(wide_stereo_buffer(SAMPLE_RATE, 1024), None);

    engine.pause();
    engine.pause();
    assert_eq!(engine.playback_state(), PlaybackState::Stopped);

    engine.play(MonitorMode::Original).unwrap();
    engine.pause();
    engine.pause();
    assert_eq!(engine.live_paths(), 0);
}

#[test]
fn test_original_monitoring_is_untouched() {
    let source = wide_stereo_buffer(SAMPLE_RATE, 1024);
    let expected = source.interleaved();
    let mut engine = engine_with(source, None);

    engine.play(MonitorMode::Original).unwrap();
    let mut block = vec![0.0; 1024 * 2];
    assert_eq!(engine.pull_monitor(&mut block).unwrap(), 1024);
    assert_eq!(block, expected);
}

#[test]
fn test_end_of_buffer_stops_playback() {
    let mut engine = engine_with(wide_stereo_buffer(SAMPLE_RATE, 700), None);
    engine.play(MonitorMode::Mastered).unwrap();

    let mut block = vec![0.0; 512 * 2];
    assert_eq!(engine.pull_monitor(&mut block).unwrap(), 512);
    assert_eq!(engine.pull_monitor(&mut block).unwrap(), 188);
    assert_eq!(engine.playback_state(), PlaybackState::Stopped);
    assert_eq!(engine.pull_monitor(&mut block).unwrap(), 0);
}

#[test]
fn test_switching_mode_restarts_from_first_frame() {
    let source = wide_stereo_buffer(SAMPLE_RATE, 4096);
    let expected = source.interleaved();
    let mut engine = engine_with(source, None);

    engine.play(MonitorMode::Mastered).unwrap();
    let mut block = vec![0.0; 600 * 2];
    assert_eq!(engine.pull_monitor(&mut block).unwrap(), 600);
    assert_eq!(engine.play_position(), Some(600));

    engine.play(MonitorMode::Original).unwrap();
    assert_eq!(engine.play_position(), Some(0));

    let head = engine.pull_monitor_block().unwrap();
    assert_eq!(head.len(), engine.monitor_block_size() * 2);
    assert_eq!(head[..], expected[..head.len()]);
    assert_eq!(engine.play_position(), Some(engine.monitor_block_size()));
}

#[test]
fn test_mono_source_fills_both_sink_channels() {
    let mut engine = engine_with(tone_buffer(1, SAMPLE_RATE, 2048, 0.3), None);
    engine.play(MonitorMode::Mastered).unwrap();

    let mut block = vec![0.0; 256 * 2];
    engine.pull_monitor(&mut block).unwrap();
    for frame in block.chunks_exact(2) {
        assert_eq!(frame[0], frame[1]);
    }
}

#[test]
fn test_clearing_reference_falls_back_to_mastered() {
    let mut engine = engine_with(
        wide_stereo_buffer(SAMPLE_RATE, 4096),
        Some(tone_buffer(2, SAMPLE_RATE, 4096, 0.2)),
    );

    engine.play(MonitorMode::Reference).unwrap();
    engine.clear_reference();

    assert_eq!(engine.mode(), MonitorMode::Mastered);
    assert_eq!(engine.live_paths(), 0);
    assert_eq!(
        engine.play(MonitorMode::Reference),
        Err(AudioError::NoReferenceLoaded)
    );
}

#[test]
fn test_reference_at_other_rate_is_monitorable() {
    let mut engine = engine_with(
        wide_stereo_buffer(SAMPLE_RATE, 44100),
        Some(tone_buffer(2, 48000, 48000, 0.2)),
    );
    engine.play(MonitorMode::Reference).unwrap();

    let mut block = vec![0.0; 1024 * 2];
    let mut total = 0;
    loop {
        let frames = engine.pull_monitor(&mut block).unwrap();
        total += frames;
        if frames < 1024 {
            break;
        }
    }

    assert_eq!(total, 44100);
}
