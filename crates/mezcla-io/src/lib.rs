//! Device backends and file helpers for the mezcla mixing engine.
//!
//! This crate provides:
//!
//! - **Native playback and capture**: [`CpalBackend`] (backend name `"native"`)
//! - **File output**: [`WaveBackend`] (backend name `"waveout"`) writing 16-bit WAV
//! - **WAV loading**: [`read_wav`] produces bytes ready for `Engine::buffer_data`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mezcla_core::{Backend, ContextAttributes, Engine, EngineSettings};
//! use mezcla_io::{CpalBackend, WaveBackend};
//!
//! let engine = Engine::with_backends(
//!     EngineSettings::default(),
//!     vec![
//!         Arc::new(CpalBackend::new()) as Arc<dyn Backend>,
//!         Arc::new(WaveBackend::new("out.wav")),
//!     ],
//! );
//! let ctx = engine.create_context(&ContextAttributes::default())?;
//! let (data, format, frequency) = mezcla_io::read_wav("input.wav")?;
//! let buffer = engine.gen_buffers(1)?[0];
//! engine.buffer_data(buffer, format, &data, frequency)?;
//! # let _ = ctx;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod cpal_backend;
pub mod queue;
pub mod wav;

pub use cpal_backend::{CpalBackend, CpalDevice};
pub use queue::SampleQueue;
pub use wav::{WaveBackend, WaveDevice, read_wav, write_wav};

use std::sync::Arc;

use mezcla_core::{Backend, NullBackend};
use thiserror::Error;

/// Error type for device and file operations.
#[derive(Error, Debug)]
pub enum Error {
    /// WAV file read/write error.
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    /// Audio stream error.
    #[error("Audio stream error: {0}")]
    Stream(String),

    /// No audio device available.
    #[error("No audio device available")]
    NoDevice,

    /// Unsupported audio format.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Audio device not found by name.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for mezcla_core::Error {
    fn from(err: Error) -> Self {
        mezcla_core::Error::Device(err.to_string())
    }
}

/// The backends a desktop engine normally carries, in default preference
/// order: `native`, then `waveout` (when a path is given), then `null`.
pub fn standard_backends(waveout: Option<WaveBackend>) -> Vec<Arc<dyn Backend>> {
    let mut backends: Vec<Arc<dyn Backend>> = vec![Arc::new(CpalBackend::new())];
    if let Some(wave) = waveout {
        backends.push(Arc::new(wave));
    }
    backends.push(Arc::new(NullBackend::paced()));
    backends
}
