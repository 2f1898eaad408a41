//! Mezcla CLI - command-line front end for the mezcla mixing engine.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mezcla")]
#[command(author, version, about = "Mezcla software mixer CLI", long_about = None)]
struct Cli {
    /// Config file (defaults to the platform search path)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List device backends and the devices they can open
    Devices(commands::devices::DevicesArgs),

    /// Play WAV files through a live device
    Play(commands::play::PlayArgs),

    /// Mix WAV files offline into a WAV file
    Render(commands::render::RenderArgs),

    /// List registered extension procedures and groups
    Extensions(commands::extensions::ExtensionsArgs),

    /// Show, create or check the configuration file
    Config(commands::config::ConfigArgs),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Devices(args) => commands::devices::run(args, config),
        Commands::Play(args) => commands::play::run(args, config),
        Commands::Render(args) => commands::render::run(args, config),
        Commands::Extensions(args) => commands::extensions::run(args),
        Commands::Config(args) => commands::config::run(args, config),
    }
}
