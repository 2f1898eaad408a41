//! The `mezcla.toml` engine configuration.

use std::path::{Path, PathBuf};

use mezcla_core::{EngineSettings, SampleFormat, SourceDefaults};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Highest accepted mixing rate.
const MAX_RATE: u32 = 384_000;
/// Highest accepted speaker count.
const MAX_SPEAKERS: usize = 8;
/// Largest accepted mix buffer.
const MAX_MIX_FRAMES: usize = 1 << 16;

/// Sample encoding requested from playback devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Signed 16-bit.
    #[default]
    I16,
    /// 32-bit float.
    F32,
}

impl From<OutputFormat> for SampleFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::I16 => SampleFormat::I16,
            OutputFormat::F32 => SampleFormat::F32,
        }
    }
}

/// `[source-defaults]`: values for source attributes never set explicitly.
/// Omitted keys keep the engine's built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct SourceDefaultsConfig {
    /// Source gain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gain: Option<f32>,
    /// Lower gain clamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_gain: Option<f32>,
    /// Upper gain clamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_gain: Option<f32>,
    /// Playback pitch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f32>,
    /// Distance at which attenuation starts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_distance: Option<f32>,
    /// Distance beyond which attenuation stops.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_distance: Option<f32>,
    /// Attenuation slope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rolloff_factor: Option<f32>,
    /// Loop by default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub looping: Option<bool>,
    /// Listener-relative by default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relative: Option<bool>,
}

impl SourceDefaultsConfig {
    /// Applies the configured values over the engine's built-in defaults.
    pub fn resolve(&self) -> SourceDefaults {
        let base = SourceDefaults::default();
        SourceDefaults {
            gain: self.gain.unwrap_or(base.gain),
            min_gain: self.min_gain.unwrap_or(base.min_gain),
            max_gain: self.max_gain.unwrap_or(base.max_gain),
            pitch: self.pitch.unwrap_or(base.pitch),
            reference_distance: self.reference_distance.unwrap_or(base.reference_distance),
            max_distance: self.max_distance.unwrap_or(base.max_distance),
            rolloff_factor: self.rolloff_factor.unwrap_or(base.rolloff_factor),
            looping: self.looping.unwrap_or(base.looping),
            relative: self.relative.unwrap_or(base.relative),
            ..base
        }
    }
}

/// `[listener]`: initial listener state of new contexts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct ListenerConfig {
    /// Master gain.
    pub gain: f32,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self { gain: 1.0 }
    }
}

/// `[waveout]`: the WAV-file output backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct WaveoutConfig {
    /// Output file.
    pub path: PathBuf,
    /// Sleep for each write's duration so async contexts run in real time.
    pub paced: bool,
}

impl Default for WaveoutConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("mezcla.wav"),
            paced: false,
        }
    }
}

/// Engine configuration as stored in `mezcla.toml`.
///
/// # Example
///
/// ```toml
/// devices = ["native", "waveout", "null"]
/// sampling-rate = 44100
/// speaker-num = 2
/// mix-buffer-frames = 1024
/// sync = false
/// output-format = "i16"
///
/// [source-defaults]
/// gain = 1.0
/// looping = false
///
/// [listener]
/// gain = 1.0
///
/// [waveout]
/// path = "mezcla.wav"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct EngineConfig {
    /// Backend names in preference order.
    pub devices: Vec<String>,
    /// Canonical mixing rate in Hz.
    pub sampling_rate: u32,
    /// Canonical speaker count.
    pub speaker_num: usize,
    /// Frames mixed per tick.
    pub mix_buffer_frames: usize,
    /// Caller-driven mixing by default.
    pub sync: bool,
    /// Sample encoding requested from playback devices.
    pub output_format: OutputFormat,
    /// `[source-defaults]` table.
    pub source_defaults: SourceDefaultsConfig,
    /// `[listener]` table.
    pub listener: ListenerConfig,
    /// `[waveout]` table.
    pub waveout: WaveoutConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let settings = EngineSettings::default();
        Self {
            devices: settings.devices,
            sampling_rate: settings.mix_rate,
            speaker_num: settings.speakers,
            mix_buffer_frames: settings.mix_frames,
            sync: settings.sync,
            output_format: OutputFormat::default(),
            source_defaults: SourceDefaultsConfig::default(),
            listener: ListenerConfig::default(),
            waveout: WaveoutConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Self::from_toml(&content)
    }

    /// Load the first config found on the search path, or the defaults.
    pub fn discover() -> Result<(Self, Option<PathBuf>), ConfigError> {
        match crate::paths::find_config() {
            Some(path) => Ok((Self::load(&path)?, Some(path))),
            None => Ok((Self::default(), None)),
        }
    }

    /// Load a configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Save the configuration to a TOML file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            crate::paths::ensure_dir(parent)?;
        }
        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        Ok(())
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Checks every value the engine would reject or misbehave on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.devices.is_empty() {
            return Err(ConfigError::invalid("devices", "list is empty"));
        }
        for (i, name) in self.devices.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(ConfigError::invalid("devices", format!("entry {i} is blank")));
            }
            if self.devices[..i].contains(name) {
                return Err(ConfigError::invalid("devices", format!("'{name}' listed twice")));
            }
        }
        if self.sampling_rate == 0 || self.sampling_rate > MAX_RATE {
            return Err(ConfigError::invalid(
                "sampling-rate",
                format!("{} is outside 1..={MAX_RATE}", self.sampling_rate),
            ));
        }
        if self.speaker_num == 0 || self.speaker_num > MAX_SPEAKERS {
            return Err(ConfigError::invalid(
                "speaker-num",
                format!("{} is outside 1..={MAX_SPEAKERS}", self.speaker_num),
            ));
        }
        if self.mix_buffer_frames == 0 || self.mix_buffer_frames > MAX_MIX_FRAMES {
            return Err(ConfigError::invalid(
                "mix-buffer-frames",
                format!("{} is outside 1..={MAX_MIX_FRAMES}", self.mix_buffer_frames),
            ));
        }
        non_negative("listener.gain", Some(self.listener.gain))?;

        let defaults = &self.source_defaults;
        non_negative("source-defaults.gain", defaults.gain)?;
        non_negative("source-defaults.min-gain", defaults.min_gain)?;
        non_negative("source-defaults.max-gain", defaults.max_gain)?;
        non_negative("source-defaults.reference-distance", defaults.reference_distance)?;
        non_negative("source-defaults.max-distance", defaults.max_distance)?;
        non_negative("source-defaults.rolloff-factor", defaults.rolloff_factor)?;
        if let Some(pitch) = defaults.pitch
            && !(pitch.is_finite() && pitch > 0.0)
        {
            return Err(ConfigError::invalid(
                "source-defaults.pitch",
                format!("{pitch} must be positive"),
            ));
        }
        let resolved = defaults.resolve();
        if resolved.min_gain > resolved.max_gain {
            return Err(ConfigError::invalid(
                "source-defaults.min-gain",
                format!(
                    "{} exceeds max-gain {}",
                    resolved.min_gain, resolved.max_gain
                ),
            ));
        }

        if self.waveout.path.as_os_str().is_empty() {
            return Err(ConfigError::invalid("waveout.path", "path is empty"));
        }
        Ok(())
    }

    /// Validates and converts into the engine's settings.
    pub fn to_settings(&self) -> Result<EngineSettings, ConfigError> {
        self.validate()?;
        Ok(EngineSettings {
            mix_rate: self.sampling_rate,
            speakers: self.speaker_num,
            mix_frames: self.mix_buffer_frames,
            sync: self.sync,
            devices: self.devices.clone(),
            source_defaults: self.source_defaults.resolve(),
            listener_gain: self.listener.gain,
            output_format: self.output_format.into(),
        })
    }
}

impl TryFrom<&EngineConfig> for EngineSettings {
    type Error = ConfigError;

    fn try_from(config: &EngineConfig) -> Result<Self, Self::Error> {
        config.to_settings()
    }
}

fn non_negative(key: &'static str, value: Option<f32>) -> Result<(), ConfigError> {
    match value {
        Some(v) if !(v.is_finite() && v >= 0.0) => Err(ConfigError::invalid(
            key,
            format!("{v} must be a finite non-negative number"),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = EngineConfig::from_toml("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.to_settings().unwrap(), EngineSettings::default());
    }

    #[test]
    fn kebab_case_keys_parse() {
        let config = EngineConfig::from_toml(
            r#"
            devices = ["waveout"]
            sampling-rate = 22050
            speaker-num = 1
            mix-buffer-frames = 256
            sync = true
            output-format = "f32"

            [source-defaults]
            max-gain = 2.0
            looping = true

            [listener]
            gain = 0.5

            [waveout]
            path = "render.wav"
            paced = true
            "#,
        )
        .unwrap();
        let settings = config.to_settings().unwrap();
        assert_eq!(settings.devices, vec!["waveout".to_string()]);
        assert_eq!(settings.mix_rate, 22050);
        assert_eq!(settings.speakers, 1);
        assert_eq!(settings.mix_frames, 256);
        assert!(settings.sync);
        assert_eq!(settings.output_format, SampleFormat::F32);
        assert_eq!(settings.source_defaults.max_gain, 2.0);
        assert!(settings.source_defaults.looping);
        assert_eq!(settings.source_defaults.gain, 1.0);
        assert_eq!(settings.listener_gain, 0.5);
        assert_eq!(config.waveout.path, PathBuf::from("render.wav"));
        assert!(config.waveout.paced);
    }

    #[test]
    fn unknown_key_is_rejected() {
        assert!(matches!(
            EngineConfig::from_toml("sample-rate = 44100"),
            Err(ConfigError::TomlParse(_))
        ));
    }

    #[test]
    fn zero_rate_is_invalid() {
        let config = EngineConfig {
            sampling_rate: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.to_settings(),
            Err(ConfigError::Invalid {
                key: "sampling-rate",
                ..
            })
        ));
    }

    #[test]
    fn duplicate_device_is_invalid() {
        let config = EngineConfig {
            devices: vec!["null".into(), "native".into(), "null".into()],
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "devices", .. })
        ));
    }

    #[test]
    fn inverted_gain_clamp_is_invalid() {
        let config = EngineConfig {
            source_defaults: SourceDefaultsConfig {
                min_gain: Some(0.9),
                max_gain: Some(0.1),
                ..SourceDefaultsConfig::default()
            },
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                key: "source-defaults.min-gain",
                ..
            })
        ));
    }

    #[test]
    fn negative_and_nan_values_are_invalid() {
        let mut config = EngineConfig::default();
        config.listener.gain = -1.0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.source_defaults.pitch = Some(f32::NAN);
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_round_trip_preserves_config() {
        let mut config = EngineConfig::default();
        config.source_defaults.gain = Some(0.25);
        config.output_format = OutputFormat::F32;
        let text = config.to_toml().unwrap();
        assert!(text.contains("sampling-rate"));
        assert!(!text.contains("min-gain"));
        assert_eq!(EngineConfig::from_toml(&text).unwrap(), config);
    }
}
