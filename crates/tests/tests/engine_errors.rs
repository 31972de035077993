//! Precondition failures surface as typed errors

use masterchain_core::domain::audio::{AudioBuffer, AudioError};
use masterchain_core::domain::config::EngineConfig;
use masterchain_core::domain::engine::{Command, CommandResult, MasteringEngine};
use masterchain_core::domain::monitor::MonitorMode;
use masterchain_core::domain::render::NoProgress;
use masterchain_tests::{tone_buffer, SAMPLE_RATE};

fn engine() -> MasteringEngine {
    MasteringEngine::new(&EngineConfig::default()).unwrap()
}

#[test]
fn test_operations_without_source() {
    let mut engine = engine();

    assert_eq!(
        engine.apply_preset_id("clean"),
        Err(AudioError::NoSourceLoaded)
    );
    assert_eq!(
        engine.play(MonitorMode::Original),
        Err(AudioError::NoSourceLoaded)
    );
    assert_eq!(
        engine.render(&mut NoProgress).map(|_| ()),
        Err(AudioError::NoSourceLoaded)
    );
    assert_eq!(
        engine.export_wav(&mut NoProgress).map(|_| ()),
        Err(AudioError::NoSourceLoaded)
    );
}

#[test]
fn test_reference_mode_without_reference() {
    let mut engine = engine();
    engine.load_source(tone_buffer(2, SAMPLE_RATE, 1024, 0.5));

    assert_eq!(
        engine.play(MonitorMode::Reference),
        Err(AudioError::NoReferenceLoaded)
    );
    assert_eq!(engine.live_paths(), 0);
}

#[test]
fn test_unknown_preset() {
    let mut engine = engine();
    engine.load_source(tone_buffer(2, SAMPLE_RATE, 1024, 0.5));

    assert!(matches!(
        engine.apply_preset_id("nonexistent"),
        Err(AudioError::PresetNotFound(id)) if id == "nonexistent"
    ));
    assert!(engine.preset().is_none());
}

#[test]
fn test_render_requires_preset() {
    let mut engine = engine();
    engine.load_source(tone_buffer(2, SAMPLE_RATE, 1024, 0.5));

    assert!(matches!(
        engine.render(&mut NoProgress),
        Err(AudioError::RenderFailure(_))
    ));
}

#[test]
fn test_second_render_job_is_rejected() {
    let mut engine = engine();
    engine.load_source(tone_buffer(2, SAMPLE_RATE, 1024, 0.5));
    engine.apply_preset_id("clean").unwrap();

    let job = engine.render_job().unwrap();
    assert!(matches!(
        engine.render_job(),
        Err(AudioError::RenderFailure(_))
    ));

    drop(job);
    assert!(engine.render_job().is_ok());
}

#[test]
fn test_invalid_buffers_are_rejected() {
    assert!(AudioBuffer::new(0, vec![vec![0.0; 4]]).is_err());
    assert!(AudioBuffer::new(44100, vec![vec![0.0; 4], vec![0.0; 3]]).is_err());
    assert!(AudioBuffer::from_interleaved(44100, 2, &[0.0; 5]).is_err());
}

#[test]
fn test_command_errors_propagate() {
    let mut engine = engine();

    assert_eq!(
        engine.execute(Command::Play {
            mode: MonitorMode::Mastered
        }),
        Err(AudioError::NoSourceLoaded)
    );

    engine
        .execute(Command::LoadSource {
            buffer: tone_buffer(1, SAMPLE_RATE, 512, 0.2).into(),
        })
        .unwrap();
    assert_eq!(engine.execute(Command::Pause), Ok(CommandResult::Paused));
}
