//! WAV file output backend and loading helpers.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use hound::{SampleFormat as WavSampleFormat, WavReader, WavSpec, WavWriter};
use mezcla_core::{Backend, Device, DeviceMode, DeviceSettings, Format, SampleFormat};

use crate::{Error, Result};

/// Writes everything the mixer plays into a 16-bit PCM WAV file.
///
/// Registered under the backend name `"waveout"`. The file is created when
/// the device is configured and finalized when it is dropped. Unless
/// [`paced`](Self::paced), writes return immediately, so an asynchronous
/// mixer renders faster than real time.
#[derive(Debug, Clone)]
pub struct WaveBackend {
    path: PathBuf,
    paced: bool,
}

impl WaveBackend {
    /// A backend writing to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            paced: false,
        }
    }

    /// Devices sleep for the duration of each write.
    #[must_use]
    pub fn paced(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }

    /// Output file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Backend for WaveBackend {
    fn name(&self) -> &str {
        "waveout"
    }

    fn open(&self, mode: DeviceMode, _device: Option<&str>) -> mezcla_core::Result<Box<dyn Device>> {
        if mode != DeviceMode::Write {
            return Err(Error::UnsupportedFormat("waveout cannot capture".into()).into());
        }
        Ok(Box::new(WaveDevice {
            path: self.path.clone(),
            paced: self.paced,
            writer: None,
            settings: DeviceSettings::default(),
            paused: false,
            frames: 0,
        }))
    }

    fn list_devices(&self, mode: DeviceMode) -> mezcla_core::Result<Vec<String>> {
        Ok(match mode {
            DeviceMode::Write => vec![self.path.display().to_string()],
            DeviceMode::Read => Vec::new(),
        })
    }
}

/// Device opened by [`WaveBackend`].
pub struct WaveDevice {
    path: PathBuf,
    paced: bool,
    writer: Option<WavWriter<BufWriter<File>>>,
    settings: DeviceSettings,
    paused: bool,
    frames: u64,
}

impl std::fmt::Debug for WaveDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaveDevice")
            .field("path", &self.path)
            .field("settings", &self.settings)
            .field("frames", &self.frames)
            .finish_non_exhaustive()
    }
}

impl WaveDevice {
    fn finish(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
            tracing::info!(path = %self.path.display(), frames = self.frames, "wave file finalized");
        }
        Ok(())
    }
}

impl Device for WaveDevice {
    fn name(&self) -> &str {
        "waveout"
    }

    fn configure(&mut self, desired: DeviceSettings) -> mezcla_core::Result<DeviceSettings> {
        self.finish()?;
        let channels = u16::try_from(desired.channels)
            .map_err(|_| Error::UnsupportedFormat(format!("{} channels", desired.channels)))?;
        let spec = WavSpec {
            channels,
            sample_rate: desired.sample_rate,
            bits_per_sample: 16,
            sample_format: WavSampleFormat::Int,
        };
        self.writer = Some(WavWriter::create(&self.path, spec).map_err(Error::from)?);
        self.settings = DeviceSettings {
            format: SampleFormat::I16,
            ..desired
        };
        self.frames = 0;
        tracing::info!(path = %self.path.display(), channels, sample_rate = desired.sample_rate, "wave file opened");
        Ok(self.settings)
    }

    fn write(&mut self, bytes: &[u8]) -> mezcla_core::Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(Error::Stream("device is not configured".into()).into());
        };
        if self.paused {
            return Ok(());
        }
        for sample in bytes.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([sample[0], sample[1]]))
                .map_err(Error::from)?;
        }
        let frames = bytes.len() / self.settings.frame_bytes().max(1);
        self.frames += frames as u64;
        if self.paced {
            std::thread::sleep(self.settings.duration_of(frames));
        }
        Ok(())
    }

    fn pause(&mut self) -> mezcla_core::Result<()> {
        self.paused = true;
        Ok(())
    }

    fn resume(&mut self) -> mezcla_core::Result<()> {
        self.paused = false;
        Ok(())
    }
}

impl Drop for WaveDevice {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to finalize wave file");
        }
    }
}

/// Reads a WAV file into interleaved bytes ready for `Engine::buffer_data`.
///
/// Returns the bytes, their [`Format`] and the file's sample rate. Integer
/// files of up to 16 bits load as 16-bit; wider integer files are truncated
/// to 16 bits; float files load as 32-bit float. Only mono and stereo are
/// accepted.
///
/// # Example
/// ```ignore
/// let (data, format, frequency) = read_wav("input.wav")?;
/// engine.buffer_data(buffer, format, &data, frequency)?;
/// ```
pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<(Vec<u8>, Format, u32)> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels);
    if channels == 0 || channels > 2 {
        return Err(Error::UnsupportedFormat(format!(
            "{} channels (only mono and stereo load)",
            spec.channels
        )));
    }

    let (data, bits) = match (spec.sample_format, spec.bits_per_sample) {
        (WavSampleFormat::Float, 32) => {
            let samples = reader
                .into_samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()?;
            (samples.iter().flat_map(|s| s.to_le_bytes()).collect(), 32)
        }
        (WavSampleFormat::Int, bits) if bits <= 16 => {
            let samples = reader
                .into_samples::<i16>()
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let shift = 16 - bits;
            (
                samples
                    .iter()
                    .flat_map(|&s| (s << shift).to_le_bytes())
                    .collect(),
                16,
            )
        }
        (WavSampleFormat::Int, bits) if bits <= 32 => {
            let samples = reader
                .into_samples::<i32>()
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let shift = bits - 16;
            (
                samples
                    .iter()
                    .flat_map(|&s| ((s >> shift) as i16).to_le_bytes())
                    .collect(),
                16,
            )
        }
        (format, bits) => {
            return Err(Error::UnsupportedFormat(format!("{bits}-bit {format:?}")));
        }
    };

    let format = Format::from_layout(channels, bits)
        .ok_or_else(|| Error::UnsupportedFormat(format!("{channels} channels at {bits} bits")))?;
    Ok((data, format, spec.sample_rate))
}

/// Writes interleaved 16-bit samples to a WAV file.
pub fn write_wav<P: AsRef<Path>>(
    path: P,
    samples: &[i16],
    channels: u16,
    sample_rate: u32,
) -> Result<()> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: WavSampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}
