//! Shared helpers for CLI commands.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use mezcla_config::EngineConfig;
use mezcla_core::{Engine, ParamValue, SourceId, SourceParam, SourceState};

/// Loads `path`, or the first config on the search path, or the defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::load(path)?,
        None => {
            let (config, found) = EngineConfig::discover()?;
            if let Some(found) = found {
                tracing::debug!(path = %found.display(), "config loaded");
            }
            config
        }
    };
    config.validate()?;
    Ok(config)
}

/// Per-source settings applied to every loaded file.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceOptions {
    /// Loop playback.
    pub looping: bool,
    /// Source gain.
    pub gain: Option<f32>,
    /// Playback pitch.
    pub pitch: Option<f32>,
}

/// A WAV file loaded into a buffer and bound to its own source.
#[derive(Debug)]
pub struct LoadedSource {
    /// File the buffer came from.
    pub path: PathBuf,
    /// Source playing it.
    pub source: SourceId,
    /// Length in frames at the engine's mixing rate.
    pub frames: u64,
}

/// Loads each file into a buffer and creates a configured source for it.
pub fn load_sources(
    engine: &Engine,
    files: &[PathBuf],
    options: SourceOptions,
) -> anyhow::Result<Vec<LoadedSource>> {
    let mix_rate = engine.settings().mix_rate;
    let buffers = engine.gen_buffers(files.len())?;
    let sources = engine.gen_sources(files.len())?;
    let mut loaded = Vec::with_capacity(files.len());

    for ((path, buffer), source) in files.iter().zip(buffers).zip(sources) {
        let (data, format, frequency) =
            mezcla_io::read_wav(path).with_context(|| format!("loading {}", path.display()))?;
        engine.buffer_data(buffer, format, &data, frequency)?;
        engine.set_source(source, SourceParam::Buffer, ParamValue::Buffer(buffer))?;
        engine.set_source(source, SourceParam::Looping, ParamValue::Bool(options.looping))?;
        if let Some(gain) = options.gain {
            engine.set_source(source, SourceParam::Gain, ParamValue::Float(gain))?;
        }
        if let Some(pitch) = options.pitch {
            engine.set_source(source, SourceParam::Pitch, ParamValue::Float(pitch))?;
        }

        let file_frames = (data.len() / format.frame_bytes()) as u64;
        let frames = file_frames * u64::from(mix_rate) / u64::from(frequency.max(1));
        println!(
            "  {}: {} frames, {} Hz, {:.1}s",
            path.display(),
            file_frames,
            frequency,
            file_frames as f64 / f64::from(frequency.max(1))
        );
        loaded.push(LoadedSource {
            path: path.clone(),
            source,
            frames,
        });
    }
    Ok(loaded)
}

/// Returns true once every source has stopped.
pub fn all_stopped(engine: &Engine, sources: &[LoadedSource]) -> anyhow::Result<bool> {
    for loaded in sources {
        if engine.source_state(loaded.source)? != SourceState::Stopped {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Source ids of `sources`.
pub fn ids(sources: &[LoadedSource]) -> Vec<SourceId> {
    sources.iter().map(|s| s.source).collect()
}
