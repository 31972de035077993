//! File-to-file mastering through the async infrastructure

use masterchain_core::domain::config::{EngineConfig, PresetManager};
use masterchain_core::domain::engine::{Command, CommandExecutor, CommandResult, MasteringEngine};
use masterchain_core::domain::preset::PresetCatalog;
use masterchain_infra::audio::{decode_file_async, SharedEngine};
use masterchain_tests::{generate_sine_wave, SAMPLE_RATE};
use std::path::Path;
use std::sync::Arc;

fn write_tone(path: &Path, channels: u16, frames: usize) {
    let spec = hound::WavSpec {
        channels,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let wave = generate_sine_wave(440.0, SAMPLE_RATE, frames, 0.25);

    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for sample in wave {
        for _ in 0..channels {
            writer.write_sample((sample * 32767.0) as i16).unwrap();
        }
    }
    writer.finalize().unwrap();
}

#[tokio::test]
async fn test_decode_master_and_write() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.wav");
    let output = dir.path().join("mastered.wav");
    write_tone(&input, 2, 22050);

    let source = decode_file_async(input).await.unwrap();
    assert_eq!(source.frames(), 22050);

    let engine = SharedEngine::new(MasteringEngine::new(&EngineConfig::default()).unwrap());
    engine
        .execute(Command::LoadSource {
            buffer: Arc::new(source),
        })
        .await;
    engine
        .execute(Command::ApplyPreset {
            id: "bright".into(),
        })
        .await;

    let handle = engine.export().await.unwrap();
    let progress = handle.progress().clone();
    let bytes = handle.join().await.unwrap();
    tokio::fs::write(&output, &bytes).await.unwrap();

    assert_eq!(progress.try_iter().last(), Some(100));

    let reader = hound::WavReader::open(&output).unwrap();
    assert_eq!(reader.spec().channels, 2);
    assert_eq!(reader.spec().sample_rate, SAMPLE_RATE);
    assert_eq!(reader.duration(), 22050);
}

#[tokio::test]
async fn test_reference_command_reports_correction() {
    let dir = tempfile::tempdir().unwrap();
    let source_path = dir.path().join("source.wav");
    let reference_path = dir.path().join("reference.wav");
    write_tone(&source_path, 1, 4410);
    write_tone(&reference_path, 1, 4410);

    let engine = SharedEngine::new(MasteringEngine::new(&EngineConfig::default()).unwrap());
    let source = decode_file_async(source_path).await.unwrap();
    let reference = decode_file_async(reference_path).await.unwrap();

    engine
        .execute(Command::LoadSource {
            buffer: Arc::new(source),
        })
        .await;
    engine
        .execute(Command::LoadReference {
            buffer: Arc::new(reference),
        })
        .await;

    match engine
        .execute(Command::SetLoudnessMatching { enabled: true })
        .await
    {
        CommandResult::LoudnessMatchingChanged {
            enabled,
            correction,
        } => {
            assert!(enabled);
            assert!((correction - 1.0).abs() < 1e-3);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_user_preset_from_disk_is_applied() {
    let dir = tempfile::tempdir().unwrap();
    let manager = PresetManager::new(dir.path().to_path_buf());

    let mut custom = PresetCatalog::builtin().get("warm").unwrap().clone();
    custom.id = "my-warm".into();
    custom.name = "My Warm".into();
    custom.output_gain = 1.5;
    manager.save_preset(&custom).await.unwrap();

    let catalog = PresetCatalog::builtin().with_user_presets(manager.load_all().await.unwrap());
    assert!(catalog.contains("my-warm"));
    assert!(!catalog.is_builtin("my-warm"));

    let engine = SharedEngine::new(
        MasteringEngine::new(&EngineConfig::default())
            .unwrap()
            .with_catalog(catalog),
    );
    let source = masterchain_tests::tone_buffer(2, SAMPLE_RATE, 2048, 0.3);
    engine
        .execute(Command::LoadSource {
            buffer: Arc::new(source),
        })
        .await;

    let result = engine
        .execute(Command::ApplyPreset {
            id: "my-warm".into(),
        })
        .await;
    assert_eq!(
        result,
        CommandResult::PresetApplied {
            id: "my-warm".into()
        }
    );
    assert_eq!(
        engine.lock().await.preset().map(|p| p.output_gain),
        Some(1.5)
    );
}
