//! Contexts: isolated playback sessions.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::device::{Device, DeviceSettings};
use crate::filter::{DistanceParams, FilterTable};
use crate::format::OutputConverter;
use crate::id::ContextId;
use crate::listener::Listener;
use crate::pool::SlabPool;
use crate::source::Source;

/// Options for [`Engine::create_context`](crate::Engine::create_context).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextAttributes {
    /// Mix synchronously (caller-driven). `None` uses the engine setting.
    pub sync: Option<bool>,
    /// Backend to open devices with. `None` tries the preference list.
    pub backend: Option<String>,
    /// Device name passed to the backend.
    pub device: Option<String>,
    /// Also open a capture device.
    pub capture: bool,
}

/// An open device plus what it negotiated and a staging area for writes.
pub(crate) struct DeviceSlot {
    pub device: Box<dyn Device>,
    pub settings: DeviceSettings,
    pub staging: Vec<u8>,
    pub converter: OutputConverter,
}

impl DeviceSlot {
    pub fn new(device: Box<dyn Device>, settings: DeviceSettings) -> Self {
        Self {
            device,
            converter: OutputConverter::new(
                settings.channels,
                settings.sample_rate,
                settings.format,
            ),
            settings,
            staging: Vec::new(),
        }
    }
}

/// A playback session: sources, listener, filters and devices.
///
/// Lock order inside a tick is: source pool (read) → filters → source slot.
pub struct Context {
    id: ContextId,
    sync: bool,
    suspended: AtomicBool,
    pub(crate) sources: RwLock<SlabPool<Source>>,
    pub(crate) listener: Mutex<Listener>,
    pub(crate) distance: Mutex<DistanceParams>,
    pub(crate) filters: Mutex<FilterTable>,
    pub(crate) output: Mutex<Option<DeviceSlot>>,
    pub(crate) input: Mutex<Option<DeviceSlot>>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("sync", &self.sync)
            .field("suspended", &self.is_suspended())
            .field("sources", &self.sources.read().len())
            .finish_non_exhaustive()
    }
}

impl Context {
    pub(crate) fn new(
        id: ContextId,
        sync: bool,
        listener: Listener,
        output: Option<DeviceSlot>,
        input: Option<DeviceSlot>,
    ) -> Self {
        Self {
            id,
            sync,
            suspended: AtomicBool::new(false),
            sources: RwLock::new(SlabPool::new()),
            listener: Mutex::new(listener),
            distance: Mutex::new(DistanceParams::default()),
            filters: Mutex::new(FilterTable::with_builtins()),
            output: Mutex::new(output),
            input: Mutex::new(input),
        }
    }

    /// Context id.
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// True for caller-driven mixing.
    pub fn is_sync(&self) -> bool {
        self.sync
    }

    /// True while suspended: the mixer skips this context's sources.
    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }

    pub(crate) fn set_suspended(&self, suspended: bool) {
        self.suspended.store(suspended, Ordering::Release);
    }

    /// Settings negotiated by the playback device.
    pub fn output_settings(&self) -> Option<DeviceSettings> {
        self.output.lock().as_ref().map(|slot| slot.settings)
    }

    /// Settings negotiated by the capture device.
    pub fn input_settings(&self) -> Option<DeviceSettings> {
        self.input.lock().as_ref().map(|slot| slot.settings)
    }

    /// Copy of the listener.
    pub fn listener(&self) -> Listener {
        *self.listener.lock()
    }

    /// Number of live sources.
    pub fn source_count(&self) -> usize {
        self.sources.read().len()
    }
}
