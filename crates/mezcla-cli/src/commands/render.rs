//! Offline render command: ticks a synchronous context into the waveout backend.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use mezcla_core::{Backend, ContextAttributes, Engine, SampleFormat};
use mezcla_io::WaveBackend;

use super::common::{SourceOptions, all_stopped, ids, load_config, load_sources};

#[derive(Args)]
pub struct RenderArgs {
    /// WAV files to mix together
    #[arg(value_name = "FILE", required = true)]
    files: Vec<PathBuf>,

    /// Output WAV file
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// Stop after this many seconds (required with --loop)
    #[arg(short, long)]
    seconds: Option<f32>,

    /// Loop every source
    #[arg(short, long)]
    r#loop: bool,

    /// Source gain
    #[arg(short, long)]
    gain: Option<f32>,

    /// Playback pitch
    #[arg(short, long)]
    pitch: Option<f32>,
}

pub fn run(args: RenderArgs, config: Option<&Path>) -> anyhow::Result<()> {
    if args.r#loop && args.seconds.is_none() {
        anyhow::bail!("--loop needs --seconds to know when to stop");
    }
    if let Some(seconds) = args.seconds
        && !(seconds.is_finite() && seconds > 0.0)
    {
        anyhow::bail!("--seconds must be positive, got {seconds}");
    }

    let config = load_config(config)?;
    let mut settings = config.to_settings()?;
    settings.sync = true;
    settings.devices = vec!["waveout".into()];
    settings.output_format = SampleFormat::I16;
    let mix_rate = settings.mix_rate;
    let mix_frames = settings.mix_frames as u64;

    let backend = WaveBackend::new(&args.output);
    let engine = Engine::with_backends(settings, vec![Arc::new(backend) as Arc<dyn Backend>]);
    let ctx = engine.create_context(&ContextAttributes {
        backend: Some("waveout".into()),
        ..ContextAttributes::default()
    })?;

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

    let limit = args
        .seconds
        .map(|s| (f64::from(s) * f64::from(mix_rate)).ceil() as u64);
    let longest = sources.iter().map(|s| s.frames).max().unwrap_or(0);
    let target = limit.unwrap_or(longest);
    let max_ticks = limit.map(|frames| frames.div_ceil(mix_frames));

    let pb = ProgressBar::new(target);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} frames ({eta})")?
            .progress_chars("##-"),
    );

    engine.play_sources(&ids(&sources))?;
    let mut ticks = 0u64;
    loop {
        if max_ticks.is_some_and(|max| ticks >= max) || all_stopped(&engine, &sources)? {
            break;
        }
        engine.process_context(ctx)?;
        ticks += 1;
        pb.set_position((ticks * mix_frames).min(target));
    }
    pb.finish_and_clear();

    engine.destroy_context(ctx)?;
    let frames = ticks * mix_frames;
    println!(
        "Wrote {} ({} frames, {:.2}s)",
        args.output.display(),
        frames,
        frames as f64 / f64::from(mix_rate)
    );
    Ok(())
}
