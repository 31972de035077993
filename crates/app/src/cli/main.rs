//! Masterchain CLI Application

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use masterchain_core::domain::config::{ConfigManager, EngineConfig, PresetManager};
use masterchain_core::domain::engine::MasteringEngine;
use masterchain_core::domain::loudness::{compute_correction, rms};
use masterchain_core::domain::preset::PresetCatalog;
use masterchain_infra::audio::{decode_file_async, spawn_export};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "masterchain")]
#[command(about = "Offline mastering chain with built-in presets", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration directory (defaults to the platform config dir)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available presets
    Presets {
        /// Print as JSON
        #[arg(long)]
        json: bool,

        /// Extra directory of user preset files
        #[arg(long)]
        preset_dir: Option<PathBuf>,
    },

    /// Master an audio file and write 16-bit WAV
    Render {
        input: PathBuf,

        /// Preset id (defaults to the configured preset)
        #[arg(short, long)]
        preset: Option<String>,

        #[arg(short, long)]
        output: PathBuf,

        /// Extra directory of user preset files
        #[arg(long)]
        preset_dir: Option<PathBuf>,
    },

    /// Report the loudness correction a reference would receive
    Match { source: PathBuf, reference: PathBuf },
}

#[derive(Serialize)]
struct PresetSummary<'a> {
    id: &'a str,
    name: &'a str,
    description: &'a str,
    builtin: bool,
}

#[derive(Serialize)]
struct MatchReport {
    source_rms: f32,
    reference_rms: f32,
    correction: f32,
}

async fn load_config(dir: Option<PathBuf>) -> anyhow::Result<EngineConfig> {
    let dir = match dir {
        Some(dir) => dir,
        None => ConfigManager::default_config_dir()?,
    };
    let config = ConfigManager::new(dir).load().await;
    config.validate()?;
    Ok(config)
}

async fn load_catalog(
    config: &EngineConfig,
    preset_dir: Option<PathBuf>,
) -> anyhow::Result<PresetCatalog> {
    let catalog = PresetCatalog::builtin();

    let Some(dir) = preset_dir.or_else(|| config.presets.user_dir.clone()) else {
        return Ok(catalog);
    };

    match PresetManager::new(dir.clone()).load_all().await {
        Ok(user) => {
            info!(count = user.len(), dir = %dir.display(), "Loaded user presets");
            Ok(catalog.with_user_presets(user))
        }
        Err(e) => {
            warn!(dir = %dir.display(), "Could not read preset directory: {}", e);
            Ok(catalog)
        }
    }
}

fn list_presets(catalog: &PresetCatalog, json: bool) -> anyhow::Result<()> {
    let summaries: Vec<_> = catalog
        .iter()
        .map(|p| PresetSummary {
            id: &p.id,
            name: &p.name,
            description: &p.description,
            builtin: catalog.is_builtin(&p.id),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        for s in &summaries {
            let tag = if s.builtin { "" } else { " (user)" };
            println!("{:<12} {}{}  {}", s.id, s.name, tag, s.description);
        }
    }
    Ok(())
}

async fn render(
    config: &EngineConfig,
    catalog: PresetCatalog,
    input: PathBuf,
    preset: Option<String>,
    output: PathBuf,
) -> anyhow::Result<()> {
    let preset = preset.unwrap_or_else(|| config.presets.default_preset.clone());
    if !catalog.contains(&preset) {
        bail!("unknown preset '{preset}'");
    }

    let source = decode_file_async(input.clone())
        .await
        .with_context(|| format!("decoding {}", input.display()))?;

    let mut engine = MasteringEngine::new(config)?.with_catalog(catalog);
    engine.load_source(source);
    engine.apply_preset_id(&preset)?;

    let handle = spawn_export(engine.render_job()?);
    let mut last = 0;
    while !handle.is_finished() {
        if let Some(percent) = handle.latest_progress() {
            if percent != last {
                info!(percent, "Rendering");
                last = percent;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let bytes = handle.join().await?;
    tokio::fs::write(&output, &bytes)
        .await
        .with_context(|| format!("writing {}", output.display()))?;

    info!(output = %output.display(), bytes = bytes.len(), preset = %preset, "Wrote mastered file");
    Ok(())
}

async fn match_loudness(source: PathBuf, reference: PathBuf) -> anyhow::Result<()> {
    let (source, reference) = tokio::try_join!(
        decode_file_async(source),
        decode_file_async(reference)
    )?;

    let report = MatchReport {
        source_rms: rms(&source),
        reference_rms: rms(&reference),
        correction: compute_correction(Some(&source), Some(&reference)),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = load_config(cli.config_dir).await?;

    match cli.command {
        Commands::Presets { json, preset_dir } => {
            let catalog = load_catalog(&config, preset_dir).await?;
            list_presets(&catalog, json)
        }
        Commands::Render {
            input,
            preset,
            output,
            preset_dir,
        } => {
            let catalog = load_catalog(&config, preset_dir).await?;
            render(&config, catalog, input, preset, output).await
        }
        Commands::Match { source, reference } => match_loudness(source, reference).await,
    }
}
