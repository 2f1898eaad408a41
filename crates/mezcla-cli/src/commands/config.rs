//! Configuration file management command.

use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use mezcla_config::{EngineConfig, paths};

use super::common::load_config;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration
    Show {
        /// Emit JSON instead of TOML
        #[arg(long)]
        json: bool,
    },

    /// Show where configuration is searched for
    Paths,

    /// Write a default configuration file
    Init {
        /// Destination (defaults to the user config file)
        #[arg(value_name = "FILE")]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Check a configuration file without using it
    Validate {
        /// File to check (defaults to --config or the search path)
        #[arg(value_name = "FILE")]
        path: Option<PathBuf>,
    },
}

pub fn run(args: ConfigArgs, config: Option<&Path>) -> anyhow::Result<()> {
    match args.command.unwrap_or(ConfigCommand::Show { json: false }) {
        ConfigCommand::Show { json } => {
            let config = load_config(config)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                print!("{}", config.to_toml()?);
            }
        }

        ConfigCommand::Paths => {
            println!("Config search order:");
            for (idx, path) in paths::search_paths().iter().enumerate() {
                let marker = if path.is_file() { " (found)" } else { "" };
                println!("  [{}] {}{}", idx + 1, path.display(), marker);
            }
            println!("\nSet {} to name a file explicitly.", paths::CONFIG_ENV);
        }

        ConfigCommand::Init { path, force } => {
            let path = path.unwrap_or_else(paths::user_config_file);
            if path.exists() && !force {
                anyhow::bail!(
                    "{} already exists. Use --force to overwrite.",
                    path.display()
                );
            }
            EngineConfig::default().save(&path)?;
            println!("Wrote {}", path.display());
        }

        ConfigCommand::Validate { path } => {
            let path = path
                .or_else(|| config.map(Path::to_path_buf))
                .or_else(paths::find_config)
                .ok_or_else(|| anyhow::anyhow!("no configuration file found"))?;
            let loaded = EngineConfig::load(&path)?;
            if let Err(err) = loaded.validate() {
                match err.key() {
                    Some(key) => anyhow::bail!("{}: check '{key}': {err}", path.display()),
                    None => return Err(err.into()),
                }
            }
            println!("{}: ok", path.display());
        }
    }
    Ok(())
}
