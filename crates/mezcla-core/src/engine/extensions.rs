//! Built-in extension procedures and the engine's registry surface.
//!
//! Every built-in is registered as a typed `fn` pointer taking `&Engine`;
//! callers recover it with [`Engine::proc_address_as`] and the matching
//! alias below.

use std::any::Any;

use mezcla_registry::{ExtensionRegistry, ProcAddress};

use super::Engine;
use crate::Result;
use crate::buffer::BufferCallback;
use crate::format::Format;
use crate::id::BufferId;

/// `mzBufferAppendData`.
pub type BufferAppendDataFn = fn(&Engine, BufferId, Format, &[u8], u32) -> Result<usize>;
/// `mzGenStreamingBuffers`.
pub type GenStreamingBuffersFn = fn(&Engine, usize) -> Result<Vec<BufferId>>;
/// `mzBufferDataWithCallback`.
pub type BufferDataWithCallbackFn = fn(&Engine, BufferId, BufferCallback, Format) -> Result<()>;
/// `mzBufferWriteData`.
pub type BufferWriteDataFn = fn(&Engine, BufferId, Format, &[u8], u32, Format) -> Result<()>;
/// `mzBufferStreamWrap`.
pub type SetStreamWrapFn = fn(&Engine, BufferId, bool) -> Result<()>;
/// `mzCaptureStart` and `mzCaptureStop`.
pub type CaptureToggleFn = fn(&Engine) -> Result<()>;
/// `mzCaptureSamples`.
pub type CaptureSamplesFn = fn(&Engine, &mut [u8]) -> Result<usize>;

const GROUPS: [&str; 4] = [
    "MEZCLA_loki_buffer_append",
    "MEZCLA_loki_callback",
    "MEZCLA_loki_streaming",
    "MEZCLA_capture",
];

pub(super) fn register_builtins(registry: &ExtensionRegistry) {
    registry.register(
        "mzBufferAppendData",
        Engine::buffer_append_data as BufferAppendDataFn,
    );
    registry.register(
        "mzGenStreamingBuffers",
        Engine::gen_streaming_buffers as GenStreamingBuffersFn,
    );
    registry.register(
        "mzBufferDataWithCallback",
        Engine::buffer_data_with_callback as BufferDataWithCallbackFn,
    );
    registry.register(
        "mzBufferWriteData",
        Engine::buffer_write_data as BufferWriteDataFn,
    );
    registry.register(
        "mzBufferStreamWrap",
        Engine::set_stream_wrap as SetStreamWrapFn,
    );
    registry.register("mzCaptureStart", Engine::capture_start as CaptureToggleFn);
    registry.register("mzCaptureStop", Engine::capture_stop as CaptureToggleFn);
    registry.register(
        "mzCaptureSamples",
        Engine::capture_samples as CaptureSamplesFn,
    );
    for group in GROUPS {
        if !registry.is_group_present(group) {
            registry.register_group(group);
        }
    }
    tracing::debug!(procs = registry.len(), "built-in extensions registered");
}

impl Engine {
    /// Looks up a registered procedure.
    pub fn get_proc_address(&self, name: &str) -> Option<ProcAddress> {
        self.shared.registry.lookup(name)
    }

    /// Looks up a registered procedure as a concrete `fn` type.
    pub fn proc_address_as<T: Any + Copy>(&self, name: &str) -> Option<T> {
        self.shared.registry.lookup_as(name)
    }

    /// Returns true if the capability group `name` is registered.
    pub fn is_extension_present(&self, name: &str) -> bool {
        self.shared.registry.is_group_present(name)
    }

    /// Registers a procedure. Returns false for an empty or duplicate name;
    /// the first registration wins.
    pub fn register_extension<T: Any + Send + Sync>(&self, name: &str, addr: T) -> bool {
        self.shared.registry.register(name, addr)
    }

    /// Registers a capability group.
    pub fn register_extension_group(&self, name: &str) -> bool {
        self.shared.registry.register_group(name)
    }

    /// Registered procedure names in order.
    pub fn extension_names(&self) -> Vec<String> {
        self.shared.registry.names()
    }

    /// Registered capability groups in registration order.
    pub fn extension_groups(&self) -> Vec<String> {
        self.shared.registry.groups()
    }
}
