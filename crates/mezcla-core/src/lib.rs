//! Software audio mixing engine.
//!
//! This crate provides:
//!
//! - **Contexts**: isolated playback sessions with a listener, filters and devices
//! - **Sources and buffers**: OpenAL-style playable entities and shared PCM storage
//! - **Mixing**: a split path, filter pipeline and size-specialized summation
//! - **Execution models**: caller-driven synchronous ticks or a background mixer thread
//! - **Devices**: the [`Device`]/[`Backend`] traits plus null and in-memory backends
//!
//! ## Quick Start
//!
//! ```rust
//! use mezcla_core::{ContextAttributes, Engine, EngineSettings, Format, ParamValue, SourceParam};
//!
//! let engine = Engine::new(EngineSettings::default());
//! let ctx = engine.create_context(&ContextAttributes {
//!     sync: Some(true),
//!     ..ContextAttributes::default()
//! })?;
//!
//! let buffer = engine.gen_buffers(1)?[0];
//! let pcm: Vec<u8> = (0..4410i16).flat_map(|s| s.to_le_bytes()).collect();
//! engine.buffer_data(buffer, Format::Mono16, &pcm, 44100)?;
//!
//! let source = engine.gen_sources(1)?[0];
//! engine.set_source(source, SourceParam::Buffer, ParamValue::Buffer(buffer))?;
//! engine.play_source(source)?;
//! engine.process_context(ctx)?;
//! # Ok::<(), mezcla_core::Error>(())
//! ```

pub mod buffer;
pub mod context;
pub mod device;
pub mod engine;
pub mod error;
pub mod filter;
pub mod format;
pub mod id;
pub mod listener;
pub mod mixer;
pub mod pool;
pub mod source;
pub mod store;

pub use buffer::{Buffer, BufferCallback, CALLBACK_SIZE, CallbackError, CallbackRequest};
pub use context::{Context, ContextAttributes};
pub use device::{
    Backend, Device, DeviceMode, DeviceSettings, MemoryBackend, MemoryHandle, NullBackend,
};
pub use engine::{BufferInfo, Engine, EngineSettings};
pub use error::{Error, ErrorState, Result};
pub use filter::{DistanceModel, DistanceParams, Filter, FilterContext};
pub use format::{Format, SampleFormat};
pub use id::{BufferId, ContextId, SourceId, SourceKey};
pub use listener::{Listener, ListenerParam};
pub use mezcla_registry::ProcAddress;
pub use source::{ParamValue, SourceDefaults, SourceParam, SourceState};
