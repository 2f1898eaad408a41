//! Device abstraction: where mixed audio goes and captured audio comes from.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────┐
//! │              Engine              │
//! │  (contexts, mixer tick, capture) │
//! └──────────────┬───────────────────┘
//!                │ opens through Backend (by preference order)
//!                ▼
//! ┌──────────────────────────────────┐
//! │          Device trait            │
//! │ configure / write / capture      │
//! └──────────────┬───────────────────┘
//!        ┌───────┼─────────┬──────────────┐
//!        ▼       ▼         ▼              ▼
//!     NullDevice MemoryDevice  (mezcla-io) native, waveout
//! ```
//!
//! ## Negotiation
//!
//! [`Device::configure`] follows a meet-or-exceed contract: the device may
//! pick a different format, channel count, rate or buffer size than asked
//! for, and the caller must use the returned [`DeviceSettings`] from then on.
//! The engine converts its canonical output to whatever was negotiated.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::Result;
use crate::error::Error;
use crate::format::SampleFormat;

/// Direction a device is opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceMode {
    /// Playback.
    Write,
    /// Capture.
    Read,
}

/// Stream parameters requested from, or granted by, a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSettings {
    /// Sample encoding.
    pub format: SampleFormat,
    /// Interleaved channels.
    pub channels: usize,
    /// Frames per second.
    pub sample_rate: u32,
    /// Frames per write.
    pub buffer_frames: usize,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            format: SampleFormat::I16,
            channels: 2,
            sample_rate: 44100,
            buffer_frames: 1024,
        }
    }
}

impl DeviceSettings {
    /// Bytes per interleaved frame.
    pub fn frame_bytes(&self) -> usize {
        self.channels * self.format.bytes()
    }

    /// Wall-clock length of `frames` frames.
    pub fn duration_of(&self, frames: usize) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(frames as f64 / f64::from(self.sample_rate))
    }
}

/// An open playback or capture device. Closing is drop.
pub trait Device: Send {
    /// Device name.
    fn name(&self) -> &str;

    /// Negotiates stream parameters; returns what the device will actually use.
    fn configure(&mut self, desired: DeviceSettings) -> Result<DeviceSettings>;

    /// Writes interleaved bytes in the negotiated format.
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Stops consuming or producing audio.
    fn pause(&mut self) -> Result<()> {
        Ok(())
    }

    /// Resumes after [`pause`](Self::pause).
    fn resume(&mut self) -> Result<()> {
        Ok(())
    }

    /// Reads up to `out.len()` captured bytes; returns how many were written.
    fn capture(&mut self, out: &mut [u8]) -> Result<usize> {
        let _ = out;
        Err(Error::IllegalCommand("device cannot capture"))
    }
}

/// A named factory for devices.
pub trait Backend: Send + Sync {
    /// Backend name used in preference lists (e.g. `"null"`, `"native"`).
    fn name(&self) -> &str;

    /// Opens a device. `device` optionally names a specific device.
    fn open(&self, mode: DeviceMode, device: Option<&str>) -> Result<Box<dyn Device>>;

    /// Lists device names this backend can open.
    fn list_devices(&self, mode: DeviceMode) -> Result<Vec<String>> {
        let _ = mode;
        Ok(vec![self.name().to_owned()])
    }
}

/// Discards audio. Optionally sleeps for each write's duration so an
/// asynchronous mixer runs at roughly real-time speed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBackend {
    paced: bool,
}

impl NullBackend {
    /// A backend whose devices return immediately.
    pub const fn new() -> Self {
        Self { paced: false }
    }

    /// A backend whose devices block for the played duration.
    pub const fn paced() -> Self {
        Self { paced: true }
    }
}

impl Backend for NullBackend {
    fn name(&self) -> &str {
        "null"
    }

    fn open(&self, mode: DeviceMode, _device: Option<&str>) -> Result<Box<dyn Device>> {
        Ok(Box::new(NullDevice {
            paced: self.paced,
            mode,
            settings: DeviceSettings::default(),
        }))
    }
}

/// Device opened by [`NullBackend`].
#[derive(Debug)]
pub struct NullDevice {
    paced: bool,
    mode: DeviceMode,
    settings: DeviceSettings,
}

impl Device for NullDevice {
    fn name(&self) -> &str {
        "null"
    }

    fn configure(&mut self, desired: DeviceSettings) -> Result<DeviceSettings> {
        self.settings = desired;
        Ok(desired)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if self.paced {
            let frame = self.settings.frame_bytes().max(1);
            std::thread::sleep(self.settings.duration_of(bytes.len() / frame));
        }
        Ok(())
    }

    fn capture(&mut self, out: &mut [u8]) -> Result<usize> {
        if self.mode != DeviceMode::Read {
            return Err(Error::IllegalCommand("device was opened for playback"));
        }
        out.fill(0);
        Ok(out.len())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    recorded: Vec<u8>,
    writes: usize,
    capture: VecDeque<u8>,
    paused: bool,
}

/// Shared view of everything written to (and queued for capture on)
/// a [`MemoryBackend`]'s devices.
#[derive(Debug, Clone, Default)]
pub struct MemoryHandle {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryHandle {
    /// Copy of every byte written so far.
    pub fn recorded(&self) -> Vec<u8> {
        self.state.lock().recorded.clone()
    }

    /// Takes and clears the recorded bytes.
    pub fn take_recorded(&self) -> Vec<u8> {
        std::mem::take(&mut self.state.lock().recorded)
    }

    /// Recorded bytes decoded as 16-bit little-endian samples.
    pub fn recorded_i16(&self) -> Vec<i16> {
        self.state
            .lock()
            .recorded
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect()
    }

    /// Number of `write` calls.
    pub fn writes(&self) -> usize {
        self.state.lock().writes
    }

    /// Queues bytes to be returned by `capture`.
    pub fn push_capture(&self, bytes: &[u8]) {
        self.state.lock().capture.extend(bytes.iter().copied());
    }

    /// Returns true while the device is paused.
    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }
}

/// Records writes in memory and replays queued bytes on capture.
///
/// By default devices accept whatever settings are requested; use
/// [`with_settings`](Self::with_settings) to force specific ones.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    handle: MemoryHandle,
    forced: Option<DeviceSettings>,
}

impl MemoryBackend {
    /// Creates a backend with a fresh shared handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Devices grant `settings` regardless of the request.
    #[must_use]
    pub fn with_settings(mut self, settings: DeviceSettings) -> Self {
        self.forced = Some(settings);
        self
    }

    /// Handle onto the shared recording.
    pub fn handle(&self) -> MemoryHandle {
        self.handle.clone()
    }
}

impl Backend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn open(&self, mode: DeviceMode, _device: Option<&str>) -> Result<Box<dyn Device>> {
        Ok(Box::new(MemoryDevice {
            handle: self.handle.clone(),
            forced: self.forced,
            mode,
        }))
    }
}

/// Device opened by [`MemoryBackend`].
#[derive(Debug)]
pub struct MemoryDevice {
    handle: MemoryHandle,
    forced: Option<DeviceSettings>,
    mode: DeviceMode,
}

impl Device for MemoryDevice {
    fn name(&self) -> &str {
        "memory"
    }

    fn configure(&mut self, desired: DeviceSettings) -> Result<DeviceSettings> {
        Ok(self.forced.unwrap_or(desired))
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if self.mode != DeviceMode::Write {
            return Err(Error::IllegalCommand("device was opened for capture"));
        }
        let mut state = self.handle.state.lock();
        if state.paused {
            return Ok(());
        }
        state.recorded.try_reserve(bytes.len())?;
        state.recorded.extend_from_slice(bytes);
        state.writes += 1;
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.handle.state.lock().paused = true;
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.handle.state.lock().paused = false;
        Ok(())
    }

    fn capture(&mut self, out: &mut [u8]) -> Result<usize> {
        if self.mode != DeviceMode::Read {
            return Err(Error::IllegalCommand("device was opened for playback"));
        }
        let mut state = self.handle.state.lock();
        let n = out.len().min(state.capture.len());
        for (dst, src) in out.iter_mut().zip(state.capture.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }
}
