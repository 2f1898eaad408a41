//! Platform-specific configuration paths.
//!
//! # Search Order
//!
//! [`find_config`] returns the first existing file of:
//!
//! 1. User config: `~/.config/mezcla/mezcla.toml` (Linux),
//!    `~/Library/Application Support/mezcla/mezcla.toml` (macOS),
//!    `%APPDATA%\mezcla\mezcla.toml` (Windows)
//! 2. System config: `/etc/mezcla/mezcla.toml` (Unix),
//!    `%PROGRAMDATA%\mezcla\mezcla.toml` (Windows)
//! 3. The file named by the `MEZCLA_CONFIG` environment variable
//!
//! # Example
//!
//! ```rust,no_run
//! use mezcla_config::{EngineConfig, paths};
//!
//! let config = match paths::find_config() {
//!     Some(path) => EngineConfig::load(path).unwrap(),
//!     None => EngineConfig::default(),
//! };
//! ```

use std::path::{Path, PathBuf};

use crate::ConfigError;

/// Application name used for directory paths.
const APP_NAME: &str = "mezcla";

/// Config file name inside the config directories.
pub const CONFIG_FILE: &str = "mezcla.toml";

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "MEZCLA_CONFIG";

/// Returns the user-specific configuration directory.
///
/// Returns a fallback path if the config directory cannot be determined.
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Returns the user config file path (which may not exist).
pub fn user_config_file() -> PathBuf {
    user_config_dir().join(CONFIG_FILE)
}

/// Returns the system-wide config file path (which may not exist).
pub fn system_config_file() -> PathBuf {
    #[cfg(unix)]
    {
        PathBuf::from("/etc").join(APP_NAME).join(CONFIG_FILE)
    }
    #[cfg(windows)]
    {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData"))
            .join(APP_NAME)
            .join(CONFIG_FILE)
    }
    #[cfg(not(any(unix, windows)))]
    {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_NAME)
            .join(CONFIG_FILE)
    }
}

/// Candidate config files in search order.
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![user_config_file(), system_config_file()];
    if let Some(explicit) = std::env::var_os(CONFIG_ENV)
        && !explicit.is_empty()
    {
        paths.push(PathBuf::from(explicit));
    }
    paths
}

/// Returns the first existing config file, if any.
pub fn find_config() -> Option<PathBuf> {
    first_existing(&search_paths())
}

/// Returns the first path in `candidates` that is a regular file.
pub fn first_existing(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates.iter().find(|p| p.is_file()).cloned()
}

/// Creates the user config directory if it does not exist.
pub fn ensure_user_config_dir() -> Result<PathBuf, ConfigError> {
    let dir = user_config_dir();
    ensure_dir(&dir)?;
    Ok(dir)
}

pub(crate) fn ensure_dir(dir: &Path) -> Result<(), ConfigError> {
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::create_dir(dir, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn user_config_file_ends_with_app() {
        let path = user_config_file();
        assert!(path.ends_with("mezcla/mezcla.toml"));
    }

    #[test]
    fn user_config_comes_first() {
        let paths = search_paths();
        assert_eq!(paths[0], user_config_file());
        assert_eq!(paths[1], system_config_file());
    }

    #[test]
    fn first_existing_skips_missing_and_dirs() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("missing.toml");
        let dir = temp.path().join("subdir");
        std::fs::create_dir(&dir).unwrap();
        let a = temp.path().join("a.toml");
        let b = temp.path().join("b.toml");
        std::fs::write(&a, "").unwrap();
        std::fs::write(&b, "").unwrap();

        let found = first_existing(&[missing.clone(), dir, b.clone(), a]);
        assert_eq!(found, Some(b));
        assert_eq!(first_existing(&[missing]), None);
    }

    #[test]
    fn ensure_dir_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("x").join("y");
        ensure_dir(&nested).unwrap();
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
