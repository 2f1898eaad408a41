//! Context lifecycle, the current-context pointer, listener and capture.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use super::{Engine, Runtime, extensions, sources};
use crate::Result;
use crate::context::{Context, ContextAttributes, DeviceSlot};
use crate::device::{Backend, Device, DeviceMode, DeviceSettings};
use crate::error::Error;
use crate::filter::{DistanceModel, DistanceParams, Filter};
use crate::format::SampleFormat;
use crate::id::{ContextId, SourceKey};
use crate::listener::{Listener, ListenerParam};
use crate::mixer::tick;
use crate::source::ParamValue;

impl Engine {
    /// Creates a context, opening its playback (and optionally capture)
    /// device. The first context created becomes current.
    ///
    /// Creating the first context also creates the runtime; an asynchronous
    /// context starts the background mixer if it is not already running.
    pub fn create_context(&self, attrs: &ContextAttributes) -> Result<ContextId> {
        let result = self.try_create_context(attrs);
        self.record(result)
    }

    fn try_create_context(&self, attrs: &ContextAttributes) -> Result<ContextId> {
        let settings = &self.shared.settings;
        settings.validate()?;
        let sync = attrs.sync.unwrap_or(settings.sync);

        let playback = DeviceSettings {
            format: settings.output_format,
            channels: settings.speakers,
            sample_rate: settings.mix_rate,
            buffer_frames: settings.mix_frames,
        };
        let output = self.open_device(DeviceMode::Write, attrs, playback)?;
        let input = if attrs.capture {
            let capture = DeviceSettings {
                format: SampleFormat::I16,
                channels: 1,
                ..playback
            };
            let mut slot = self.open_device(DeviceMode::Read, attrs, capture)?;
            slot.device.pause()?;
            Some(slot)
        } else {
            None
        };

        self.ensure_runtime();
        let id = ContextId(self.shared.next_context.fetch_add(1, Ordering::Relaxed));
        let ctx = Arc::new(Context::new(
            id,
            sync,
            Listener::with_gain(settings.listener_gain),
            Some(output),
            input,
        ));
        self.shared.contexts.write().insert(id, ctx);
        {
            let mut current = self.shared.current.write();
            if current.is_none() {
                *current = Some(id);
            }
        }
        if !sync {
            self.ensure_mixer_thread()?;
        }
        tracing::debug!(context = %id, sync, "context created");
        Ok(id)
    }

    /// Opens a device through the named backend, or through the preference
    /// list followed by every other backend.
    fn open_device(
        &self,
        mode: DeviceMode,
        attrs: &ContextAttributes,
        desired: DeviceSettings,
    ) -> Result<DeviceSlot> {
        let backends = self.shared.backends.read().clone();
        let candidates: Vec<Arc<dyn Backend>> = match &attrs.backend {
            Some(name) => {
                let backend = backends
                    .iter()
                    .find(|b| b.name() == name)
                    .cloned()
                    .ok_or_else(|| Error::Device(format!("no backend named {name}")))?;
                vec![backend]
            }
            None => {
                let preferred = &self.shared.settings.devices;
                let mut ordered: Vec<Arc<dyn Backend>> = preferred
                    .iter()
                    .filter_map(|name| backends.iter().find(|b| b.name() == name).cloned())
                    .collect();
                ordered.extend(
                    backends
                        .iter()
                        .filter(|b| !preferred.iter().any(|p| p == b.name()))
                        .cloned(),
                );
                ordered
            }
        };

        let mut last_error = None;
        for backend in candidates {
            match open_and_configure(backend.as_ref(), mode, attrs.device.as_deref(), desired) {
                Ok(slot) => return Ok(slot),
                Err(e) => {
                    tracing::warn!(backend = backend.name(), error = %e, "backend failed to open device");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| Error::Device("no backend available".into())))
    }

    /// Creates the runtime and registers built-in extensions if needed.
    fn ensure_runtime(&self) -> Arc<Runtime> {
        let mut runtime = self.shared.runtime.write();
        if let Some(rt) = runtime.as_ref() {
            return Arc::clone(rt);
        }
        extensions::register_builtins(&self.shared.registry);
        let fresh = Arc::new(Runtime::default());
        *runtime = Some(Arc::clone(&fresh));
        tracing::info!("runtime initialized");
        fresh
    }

    /// Destroys a context, releasing its sources' buffer references.
    ///
    /// Destroying the last context tears the runtime down: the buffer store,
    /// mixer and extension registry are discarded and the mixer thread stops.
    pub fn destroy_context(&self, id: ContextId) -> Result<()> {
        let result = self.try_destroy_context(id);
        self.record(result)
    }

    fn try_destroy_context(&self, id: ContextId) -> Result<()> {
        let _paused = self.shared.pause.lock();
        let ctx = self
            .shared
            .contexts
            .write()
            .remove(&id)
            .ok_or(Error::no_context(id.raw()))?;

        if let Some(rt) = self.shared.runtime() {
            let mut mixer = rt.mixer.lock();
            let doomed: Vec<u32> = mixer
                .pool
                .iter()
                .filter(|(_, entry)| entry.lock().key.context == id)
                .map(|(slot, _)| slot)
                .collect();
            for slot in doomed {
                mixer.remove_source(slot);
            }
            let mut pool = ctx.sources.write();
            let mut store = rt.store.lock();
            pool.free_all(|src| {
                sources::release_references(&src, SourceKey::new(id, src.id()), &mut store);
            });
        }

        {
            let mut current = self.shared.current.write();
            if *current == Some(id) {
                *current = None;
            }
        }
        tracing::debug!(context = %id, "context destroyed");

        if self.shared.contexts.read().is_empty() {
            self.stop_mixer_thread();
            *self.shared.runtime.write() = None;
            self.shared.registry.clear();
            tracing::info!("runtime torn down");
        }
        Ok(())
    }

    /// Makes `id` current, or clears the current context with `None`.
    ///
    /// Holds the mixer pause lock while switching.
    pub fn make_context_current(&self, id: Option<ContextId>) -> Result<()> {
        let result = self.try_make_context_current(id);
        self.record(result)
    }

    fn try_make_context_current(&self, id: Option<ContextId>) -> Result<()> {
        let _paused = self.shared.pause.lock();
        if let Some(id) = id
            && !self.shared.contexts.read().contains_key(&id)
        {
            return Err(Error::no_context(id.raw()));
        }
        *self.shared.current.write() = id;
        Ok(())
    }

    /// Resumes a suspended context and, if it is synchronous, runs one tick.
    ///
    /// Asynchronous contexts are mixed by the background thread; for them
    /// this only clears suspension.
    pub fn process_context(&self, id: ContextId) -> Result<()> {
        let result = self.try_process_context(id);
        self.record(result)
    }

    fn try_process_context(&self, id: ContextId) -> Result<()> {
        let ctx = self.context(id)?;
        ctx.set_suspended(false);
        if !ctx.is_sync() {
            return Ok(());
        }
        let rt = self.runtime()?;
        tick::run(&rt.mixer, &rt.store, &ctx, self.shared.settings.tick_params())
    }

    /// Suspends a context: its sources are skipped until it is processed.
    pub fn suspend_context(&self, id: ContextId) -> Result<()> {
        let result = self.context(id).map(|ctx| ctx.set_suspended(true));
        self.record(result)
    }

    /// Ids of every live context.
    pub fn contexts(&self) -> Vec<ContextId> {
        self.shared.contexts.read().keys().copied().collect()
    }

    /// The current context, if any.
    pub fn current_context(&self) -> Option<ContextId> {
        *self.shared.current.read()
    }

    /// Settings negotiated by a context's playback device.
    pub fn context_output_settings(&self, id: ContextId) -> Result<Option<DeviceSettings>> {
        let result = self.context(id).map(|ctx| ctx.output_settings());
        self.record(result)
    }

    /// Returns true if `id` names a synchronous context.
    pub fn is_context_sync(&self, id: ContextId) -> Result<bool> {
        let result = self.context(id).map(|ctx| ctx.is_sync());
        self.record(result)
    }

    pub(super) fn context(&self, id: ContextId) -> Result<Arc<Context>> {
        self.shared
            .contexts
            .read()
            .get(&id)
            .cloned()
            .ok_or(Error::no_context(id.raw()))
    }

    /// Sets a listener attribute of the current context.
    pub fn set_listener(&self, param: ListenerParam, value: ParamValue) -> Result<()> {
        let result = self
            .current()
            .and_then(|(_, ctx)| ctx.listener.lock().set(param, value));
        self.record(result)
    }

    /// Reads a listener attribute of the current context.
    pub fn get_listener(&self, param: ListenerParam) -> Result<ParamValue> {
        let result = self.current().map(|(_, ctx)| ctx.listener().get(param));
        self.record(result)
    }

    /// Sets the distance model of the current context.
    pub fn set_distance_model(&self, model: DistanceModel) -> Result<()> {
        let result = self
            .current()
            .map(|(_, ctx)| ctx.distance.lock().model = model);
        self.record(result)
    }

    /// Distance parameters of the current context.
    pub fn distance_params(&self) -> Result<DistanceParams> {
        let result = self.current().map(|(_, ctx)| *ctx.distance.lock());
        self.record(result)
    }

    /// Sets the doppler factor (`>= 0`) of the current context.
    pub fn set_doppler_factor(&self, factor: f32) -> Result<()> {
        let result = if factor.is_finite() && factor >= 0.0 {
            self.current()
                .map(|(_, ctx)| ctx.distance.lock().doppler_factor = factor)
        } else {
            Err(Error::InvalidValue("doppler factor"))
        };
        self.record(result)
    }

    /// Sets the doppler reference velocity (`> 0`) of the current context.
    pub fn set_doppler_velocity(&self, velocity: f32) -> Result<()> {
        let result = if velocity.is_finite() && velocity > 0.0 {
            self.current()
                .map(|(_, ctx)| ctx.distance.lock().doppler_velocity = velocity)
        } else {
            Err(Error::InvalidValue("doppler velocity"))
        };
        self.record(result)
    }

    /// Appends a filter to the current context's pipeline.
    pub fn insert_filter(&self, filter: Box<dyn Filter>) -> Result<()> {
        let result = self
            .current()
            .and_then(|(_, ctx)| ctx.filters.lock().insert(filter));
        self.record(result)
    }

    /// Removes the first filter called `name` from the current context.
    pub fn remove_filter(&self, name: &str) -> Result<bool> {
        let result = self
            .current()
            .map(|(_, ctx)| ctx.filters.lock().remove(name));
        self.record(result)
    }

    /// Filter names of the current context, in pipeline order.
    pub fn filter_names(&self) -> Result<Vec<String>> {
        let result = self.current().map(|(_, ctx)| ctx.filters.lock().names());
        self.record(result)
    }

    /// Starts the current context's capture device.
    pub fn capture_start(&self) -> Result<()> {
        let result = self.with_capture(|slot| slot.device.resume());
        self.record(result)
    }

    /// Stops the current context's capture device.
    pub fn capture_stop(&self) -> Result<()> {
        let result = self.with_capture(|slot| slot.device.pause());
        self.record(result)
    }

    /// Reads captured 16-bit mono bytes into `out`; returns bytes written.
    pub fn capture_samples(&self, out: &mut [u8]) -> Result<usize> {
        let result = self.with_capture(|slot| slot.device.capture(out));
        self.record(result)
    }

    /// Settings negotiated by the current context's capture device.
    pub fn capture_settings(&self) -> Result<DeviceSettings> {
        let result = self.with_capture(|slot| Ok(slot.settings));
        self.record(result)
    }

    fn with_capture<T>(&self, f: impl FnOnce(&mut DeviceSlot) -> Result<T>) -> Result<T> {
        let (_, ctx) = self.current()?;
        let mut input = ctx.input.lock();
        let slot = input
            .as_mut()
            .ok_or(Error::IllegalCommand("context has no capture device"))?;
        f(slot)
    }
}

fn open_and_configure(
    backend: &dyn Backend,
    mode: DeviceMode,
    name: Option<&str>,
    desired: DeviceSettings,
) -> Result<DeviceSlot> {
    let mut device: Box<dyn Device> = backend.open(mode, name)?;
    let granted = device.configure(desired)?;
    if granted.channels == 0 || granted.sample_rate == 0 {
        return Err(Error::Device(format!(
            "{} granted unusable settings",
            device.name()
        )));
    }
    tracing::info!(
        backend = backend.name(),
        device = device.name(),
        ?mode,
        channels = granted.channels,
        rate = granted.sample_rate,
        format = ?granted.format,
        frames = granted.buffer_frames,
        "device configured"
    );
    Ok(DeviceSlot::new(device, granted))
}
