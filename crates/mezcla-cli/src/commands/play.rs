//! Live playback command: mixes WAV files on the background mixer thread.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Args;
use mezcla_core::{ContextAttributes, Engine};
use mezcla_io::WaveBackend;

use super::common::{SourceOptions, all_stopped, ids, load_config, load_sources};

#[derive(Args)]
pub struct PlayArgs {
    /// WAV files to mix together
    #[arg(value_name = "FILE", required = true)]
    files: Vec<PathBuf>,

    /// Backend to open (defaults to the configured preference order)
    #[arg(short, long)]
    backend: Option<String>,

    /// Device name (or part of it) passed to the backend
    #[arg(short, long)]
    device: Option<String>,

    /// Loop playback until Ctrl+C
    #[arg(short, long, alias = "repeat")]
    r#loop: bool,

    /// Source gain
    #[arg(short, long)]
    gain: Option<f32>,

    /// Playback pitch
    #[arg(short, long)]
    pitch: Option<f32>,
}

pub fn run(args: PlayArgs, config: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let wave = WaveBackend::new(&config.waveout.path).paced(config.waveout.paced);
    let engine = Engine::with_backends(
        config.to_settings()?,
        mezcla_io::standard_backends(Some(wave)),
    );

    let ctx = engine.create_context(&ContextAttributes {
        sync: Some(false),
        backend: args.backend,
        device: args.device,
        capture: false,
    })?;
    if let Some(output) = engine.context_output_settings(ctx)? {
        println!(
            "Output: {} channel(s), {} Hz, {:?}",
            output.channels, output.sample_rate, output.format
        );
    }

    println!("Loading {} file(s)...", args.files.len());
    let sources = load_sources(
        &engine,
        &args.files,
        SourceOptions {
            looping: args.r#loop,
            gain: args.gain,
            pitch: args.pitch,
        },
    )?;

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        println!("\nStopping...");
        r.store(false, Ordering::SeqCst);
    })?;

    println!(
        "\nPlaying{}... Press Ctrl+C to stop.\n",
        if args.r#loop { " (looping)" } else { "" }
    );
    engine.play_sources(&ids(&sources))?;

    while running.load(Ordering::SeqCst) && !all_stopped(&engine, &sources)? {
        std::thread::sleep(Duration::from_millis(50));
        if let Some(err) = engine.take_error() {
            tracing::warn!(error = %err, "engine reported an error");
        }
    }

    engine.stop_sources(&ids(&sources))?;
    engine.destroy_context(ctx)?;
    println!("Done.");
    Ok(())
}
