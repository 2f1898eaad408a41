//! Configuration errors.
//!
//! File access failures carry the path involved; validation failures carry
//! the offending key spelled as in `mezcla.toml` (`sampling-rate`,
//! `source-defaults.pitch`, ...), so a front end can point at the line to fix.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from loading, validating or saving an engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("cannot read config '{path}': {source}")]
    ReadFile {
        /// File that was opened.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file could not be written.
    #[error("cannot write config '{path}': {source}")]
    WriteFile {
        /// File that was written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or has unknown keys.
    #[error("malformed config: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// The configuration could not be rendered as TOML.
    #[error("cannot render config as TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// A key holds a value the engine cannot use.
    #[error("invalid value for '{key}': {reason}")]
    Invalid {
        /// Key as spelled in the file, dotted for table entries.
        key: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The config directory could not be created.
    #[error("cannot create config directory '{path}': {source}")]
    CreateDir {
        /// Directory that was created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    pub(crate) fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::ReadFile {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::WriteFile {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn create_dir(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::CreateDir {
            path: path.into(),
            source,
        }
    }

    /// A rejected value for `key`.
    pub fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key,
            reason: reason.into(),
        }
    }

    /// The config key a validation failure is about.
    pub fn key(&self) -> Option<&'static str> {
        match self {
            ConfigError::Invalid { key, .. } => Some(key),
            _ => None,
        }
    }

    /// The file or directory an I/O failure is about.
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::ReadFile { path, .. }
            | ConfigError::WriteFile { path, .. }
            | ConfigError::CreateDir { path, .. } => Some(path),
            _ => None,
        }
    }
}
