//! Configuration for the mezcla mixing engine.
//!
//! # Features
//!
//! - **Engine config**: `mezcla.toml` with device preferences, mix format and defaults
//! - **Validation**: range checks before anything reaches the engine
//! - **Paths**: platform config locations plus the `MEZCLA_CONFIG` override
//!
//! # Example
//!
//! ```rust
//! use mezcla_config::EngineConfig;
//!
//! let config = EngineConfig::from_toml(r#"
//!     devices = ["native", "null"]
//!     sampling-rate = 48000
//!     speaker-num = 2
//!
//!     [source-defaults]
//!     gain = 0.8
//! "#).unwrap();
//!
//! let settings = config.to_settings().unwrap();
//! assert_eq!(settings.mix_rate, 48000);
//! assert_eq!(settings.source_defaults.gain, 0.8);
//! ```

mod engine_config;
mod error;

/// Platform-specific configuration paths.
pub mod paths;

pub use engine_config::{
    EngineConfig, ListenerConfig, OutputFormat, SourceDefaultsConfig, WaveoutConfig,
};
pub use error::ConfigError;
pub use paths::{
    CONFIG_ENV, CONFIG_FILE, ensure_user_config_dir, find_config, first_existing, search_paths,
    system_config_file, user_config_dir, user_config_file,
};
