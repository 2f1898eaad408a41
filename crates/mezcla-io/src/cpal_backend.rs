//! cpal-based native backend.
//!
//! [`CpalBackend`] opens the platform's default host (ALSA, CoreAudio,
//! WASAPI) under the backend name `"native"`.
//!
//! Playback streams are fed through a bounded [`SampleQueue`]: the mixer's
//! `write` blocks until the cpal callback has drained room, so an
//! asynchronous mixer thread runs at the device's pace. Capture streams push
//! into a queue of their own that `capture` drains, converting to the
//! negotiated channel count and sample encoding.
//!
//! Playback always negotiates `f32` samples at the hardware channel count and
//! rate closest to the request; the engine converts its output to match.

use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use mezcla_core::format::f32_to_i16;
use mezcla_core::{Backend, Device, DeviceMode, DeviceSettings, SampleFormat};

use crate::queue::SampleQueue;
use crate::{Error, Result};

/// Mix periods of playback audio buffered ahead of the device.
const OUTPUT_PERIODS: usize = 4;

/// Longest a playback write waits for the device before failing.
const WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Extract device name via `description()` (cpal 0.17+).
fn device_name(device: &cpal::Device) -> std::result::Result<String, cpal::DeviceNameError> {
    device.description().map(|d| d.name().to_string())
}

/// Native playback and capture through cpal.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpalBackend;

impl CpalBackend {
    /// Creates the backend. Devices are resolved against the default host
    /// each time one is opened.
    pub fn new() -> Self {
        tracing::info!(
            host = cpal::default_host().id().name(),
            "cpal backend initialized"
        );
        Self
    }

    /// Finds a device whose name contains `name` (case-insensitive), or the
    /// host default.
    fn find_device(mode: DeviceMode, name: Option<&str>) -> Result<cpal::Device> {
        let host = cpal::default_host();
        let Some(search) = name else {
            let device = match mode {
                DeviceMode::Write => host.default_output_device(),
                DeviceMode::Read => host.default_input_device(),
            };
            return device.ok_or(Error::NoDevice);
        };

        let search_lower = search.to_lowercase();
        let devices: Vec<cpal::Device> = match mode {
            DeviceMode::Write => host
                .output_devices()
                .map_err(|e| Error::Stream(e.to_string()))?
                .collect(),
            DeviceMode::Read => host
                .input_devices()
                .map_err(|e| Error::Stream(e.to_string()))?
                .collect(),
        };
        devices
            .into_iter()
            .find(|device| {
                device_name(device).is_ok_and(|n| n.to_lowercase().contains(&search_lower))
            })
            .ok_or_else(|| Error::DeviceNotFound(format!("no device matching '{}'", search)))
    }
}

impl Backend for CpalBackend {
    fn name(&self) -> &str {
        "native"
    }

    fn open(&self, mode: DeviceMode, device: Option<&str>) -> mezcla_core::Result<Box<dyn Device>> {
        let device = Self::find_device(mode, device)?;
        let name = device_name(&device).unwrap_or_else(|_| "unknown".into());
        tracing::debug!(device = %name, ?mode, "cpal device opened");
        Ok(Box::new(CpalDevice {
            name,
            device,
            mode,
            queue: Arc::new(SampleQueue::new(1)),
            stream: None,
            settings: DeviceSettings::default(),
            paused: false,
            scratch: Vec::new(),
        }))
    }

    fn list_devices(&self, mode: DeviceMode) -> mezcla_core::Result<Vec<String>> {
        let host = cpal::default_host();
        let devices: Vec<cpal::Device> = match mode {
            DeviceMode::Write => host
                .output_devices()
                .map_err(|e| Error::Stream(e.to_string()))?
                .collect(),
            DeviceMode::Read => host
                .input_devices()
                .map_err(|e| Error::Stream(e.to_string()))?
                .collect(),
        };
        Ok(devices
            .iter()
            .filter_map(|device| device_name(device).ok())
            .collect())
    }
}

/// A device opened by [`CpalBackend`]. The stream starts on `configure`
/// and stops on drop.
pub struct CpalDevice {
    name: String,
    device: cpal::Device,
    mode: DeviceMode,
    queue: Arc<SampleQueue>,
    stream: Option<cpal::Stream>,
    settings: DeviceSettings,
    paused: bool,
    scratch: Vec<f32>,
}

impl std::fmt::Debug for CpalDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpalDevice")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("settings", &self.settings)
            .field("paused", &self.paused)
            .finish_non_exhaustive()
    }
}

/// Picks an `f32` configuration at the requested rate, preferring the
/// requested channel count.
fn choose_config(
    ranges: Vec<cpal::SupportedStreamConfigRange>,
    desired: &DeviceSettings,
) -> Option<cpal::SupportedStreamConfig> {
    let rate = desired.sample_rate;
    let fits = |r: &&cpal::SupportedStreamConfigRange| {
        r.sample_format() == cpal::SampleFormat::F32
            && r.min_sample_rate() <= rate
            && rate <= r.max_sample_rate()
    };
    ranges
        .iter()
        .filter(fits)
        .find(|r| usize::from(r.channels()) == desired.channels)
        .or_else(|| ranges.iter().find(fits))
        .map(|r| r.clone().with_sample_rate(rate))
}

/// Maps one interleaved `f32` frame onto `out.len()` channels.
fn map_frame_f32(input: &[f32], out: &mut [f32]) {
    if input.is_empty() {
        out.fill(0.0);
        return;
    }
    if out.len() == 1 && input.len() > 1 {
        out[0] = input.iter().sum::<f32>() / input.len() as f32;
        return;
    }
    for (i, o) in out.iter_mut().enumerate() {
        *o = input[i % input.len()];
    }
}

impl CpalDevice {
    fn negotiate(&self, desired: &DeviceSettings) -> Result<cpal::SupportedStreamConfig> {
        let ranges: Vec<_> = match self.mode {
            DeviceMode::Write => self
                .device
                .supported_output_configs()
                .map_err(|e| Error::Stream(e.to_string()))?
                .collect(),
            DeviceMode::Read => self
                .device
                .supported_input_configs()
                .map_err(|e| Error::Stream(e.to_string()))?
                .collect(),
        };
        if let Some(config) = choose_config(ranges, desired) {
            return Ok(config);
        }
        let fallback = match self.mode {
            DeviceMode::Write => self.device.default_output_config(),
            DeviceMode::Read => self.device.default_input_config(),
        };
        let fallback = fallback.map_err(|e| Error::Stream(e.to_string()))?;
        if fallback.sample_format() != cpal::SampleFormat::F32 {
            return Err(Error::UnsupportedFormat(format!(
                "device '{}' offers no f32 stream",
                self.name
            )));
        }
        Ok(fallback)
    }

    fn build_output(&mut self, config: &cpal::StreamConfig) -> Result<cpal::Stream> {
        let queue = Arc::clone(&self.queue);
        self.device
            .build_output_stream(
                config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    queue.pop_into(data);
                },
                |err| tracing::warn!(error = %err, "output stream error"),
                None,
            )
            .map_err(|e| Error::Stream(e.to_string()))
    }

    fn build_input(&mut self, config: &cpal::StreamConfig, channels: usize) -> Result<cpal::Stream> {
        let queue = Arc::clone(&self.queue);
        let hw_channels = usize::from(config.channels);
        let mut mapped = Vec::new();
        let mut frame = vec![0.0f32; channels];
        self.device
            .build_input_stream(
                config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    mapped.clear();
                    for input in data.chunks_exact(hw_channels) {
                        map_frame_f32(input, &mut frame);
                        mapped.extend_from_slice(&frame);
                    }
                    queue.push_lossy(&mapped);
                },
                |err| tracing::warn!(error = %err, "input stream error"),
                None,
            )
            .map_err(|e| Error::Stream(e.to_string()))
    }

    fn start(&mut self, desired: DeviceSettings) -> Result<DeviceSettings> {
        self.queue.close();
        self.stream = None;

        let supported = self.negotiate(&desired)?;
        let config = supported.config();
        let hw_channels = usize::from(config.channels);
        let granted = match self.mode {
            DeviceMode::Write => DeviceSettings {
                format: SampleFormat::F32,
                channels: hw_channels,
                sample_rate: config.sample_rate,
                buffer_frames: desired.buffer_frames,
            },
            DeviceMode::Read => DeviceSettings {
                format: desired.format,
                channels: desired.channels.max(1),
                sample_rate: config.sample_rate,
                buffer_frames: desired.buffer_frames,
            },
        };

        let stream = match self.mode {
            DeviceMode::Write => {
                let capacity = granted.buffer_frames.max(1) * hw_channels * OUTPUT_PERIODS;
                self.queue = Arc::new(SampleQueue::new(capacity));
                self.build_output(&config)?
            }
            DeviceMode::Read => {
                let capacity = granted.sample_rate as usize * granted.channels;
                self.queue = Arc::new(SampleQueue::new(capacity));
                self.build_input(&config, granted.channels)?
            }
        };
        stream.play().map_err(|e| Error::Stream(e.to_string()))?;
        tracing::info!(
            device = %self.name,
            channels = granted.channels,
            sample_rate = granted.sample_rate,
            "cpal stream started"
        );

        self.stream = Some(stream);
        self.settings = granted;
        self.paused = false;
        Ok(granted)
    }

    fn stream(&self) -> Result<&cpal::Stream> {
        self.stream
            .as_ref()
            .ok_or_else(|| Error::Stream("device is not configured".into()))
    }
}

impl Device for CpalDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn configure(&mut self, desired: DeviceSettings) -> mezcla_core::Result<DeviceSettings> {
        Ok(self.start(desired)?)
    }

    fn write(&mut self, bytes: &[u8]) -> mezcla_core::Result<()> {
        if self.mode != DeviceMode::Write {
            return Err(mezcla_core::Error::IllegalCommand("device was opened for capture"));
        }
        self.stream()?;
        if self.paused {
            return Ok(());
        }
        self.scratch.clear();
        self.scratch.extend(
            bytes
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        );
        if !self.queue.push_blocking(&self.scratch, WRITE_TIMEOUT) {
            return Err(Error::Stream("output stream stalled".into()).into());
        }
        Ok(())
    }

    fn pause(&mut self) -> mezcla_core::Result<()> {
        self.stream()?
            .pause()
            .map_err(|e| Error::Stream(e.to_string()))?;
        self.paused = true;
        Ok(())
    }

    fn resume(&mut self) -> mezcla_core::Result<()> {
        self.stream()?
            .play()
            .map_err(|e| Error::Stream(e.to_string()))?;
        self.paused = false;
        Ok(())
    }

    fn capture(&mut self, out: &mut [u8]) -> mezcla_core::Result<usize> {
        if self.mode != DeviceMode::Read {
            return Err(mezcla_core::Error::IllegalCommand("device was opened for playback"));
        }
        self.stream()?;
        let width = self.settings.format.bytes();
        self.scratch.resize(out.len() / width, 0.0);
        let n = self.queue.pop_available(&mut self.scratch);
        for (dst, &sample) in out.chunks_exact_mut(width).zip(&self.scratch[..n]) {
            match self.settings.format {
                SampleFormat::I16 => dst.copy_from_slice(&f32_to_i16(sample).to_le_bytes()),
                SampleFormat::F32 => dst.copy_from_slice(&sample.to_le_bytes()),
            }
        }
        Ok(n * width)
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        self.queue.close();
        if self.stream.take().is_some() {
            tracing::debug!(device = %self.name, "cpal stream stopped");
        }
    }
}
