//! The engine: top-level owner of every context, buffer and the mixer.
//!
//! An [`Engine`] replaces what would otherwise be process-wide state. It
//! owns the context table, the current-context pointer, the shared error
//! state, the device backends, the extension registry and (while at least
//! one context exists) a [`Runtime`] holding the buffer store and mixer.
//!
//! ## Lifecycle
//!
//! The runtime is created with the first context and torn down with the
//! last one. Tearing down also clears the extension registry and stops the
//! background mixer thread; creating a context afterwards starts again from
//! scratch.
//!
//! ## Errors
//!
//! Every public operation returns [`Result`]. Failures are additionally
//! recorded in the engine's [`ErrorState`]; the first one wins until
//! [`Engine::take_error`] reads it.

mod buffers;
mod contexts;
mod extensions;
mod sources;

pub use buffers::BufferInfo;
pub use extensions::{
    BufferAppendDataFn, BufferDataWithCallbackFn, BufferWriteDataFn, CaptureSamplesFn,
    CaptureToggleFn, GenStreamingBuffersFn, SetStreamWrapFn,
};

use std::collections::BTreeMap;
use std::sync::atomic::AtomicU32;
use std::sync::{Arc, Weak};

use mezcla_registry::ExtensionRegistry;
use parking_lot::{Mutex, RwLock};

use crate::Result;
use crate::context::Context;
use crate::device::{Backend, NullBackend};
use crate::error::{Error, ErrorState};
use crate::format::SampleFormat;
use crate::id::ContextId;
use crate::mixer::Mixer;
use crate::mixer::thread::{MixerThread, Step};
use crate::mixer::tick::{self, TickParams};
use crate::source::SourceDefaults;
use crate::store::BufferStore;

/// Engine-wide settings, usually loaded from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Canonical mixing rate in Hz.
    pub mix_rate: u32,
    /// Canonical speaker (channel) count of the mix.
    pub speakers: usize,
    /// Frames mixed per tick.
    pub mix_frames: usize,
    /// Default execution model for new contexts.
    pub sync: bool,
    /// Backend names in preference order.
    pub devices: Vec<String>,
    /// Values for source attributes never set.
    pub source_defaults: SourceDefaults,
    /// Initial listener gain of new contexts.
    pub listener_gain: f32,
    /// Sample encoding requested from playback devices.
    pub output_format: SampleFormat,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            mix_rate: 44100,
            speakers: 2,
            mix_frames: 1024,
            sync: false,
            devices: vec!["native".into(), "null".into()],
            source_defaults: SourceDefaults::default(),
            listener_gain: 1.0,
            output_format: SampleFormat::I16,
        }
    }
}

impl EngineSettings {
    pub(crate) fn tick_params(&self) -> TickParams {
        TickParams {
            mix_rate: self.mix_rate,
            speakers: self.speakers,
            frames: self.mix_frames,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.mix_rate == 0 {
            return Err(Error::InvalidValue("mix rate must be positive"));
        }
        if self.speakers == 0 {
            return Err(Error::InvalidValue("speaker count must be positive"));
        }
        if self.mix_frames == 0 {
            return Err(Error::InvalidValue("mix buffer must hold at least one frame"));
        }
        Ok(())
    }
}

/// Buffer store and mixer, alive while any context exists.
#[derive(Debug, Default)]
pub(crate) struct Runtime {
    pub store: Mutex<BufferStore>,
    pub mixer: Mutex<Mixer>,
}

pub(crate) struct Shared {
    pub settings: EngineSettings,
    pub backends: RwLock<Vec<Arc<dyn Backend>>>,
    pub error: ErrorState,
    pub registry: ExtensionRegistry,
    pub contexts: RwLock<BTreeMap<ContextId, Arc<Context>>>,
    pub next_context: AtomicU32,
    pub current: RwLock<Option<ContextId>>,
    pub runtime: RwLock<Option<Arc<Runtime>>>,
    pub thread: Mutex<Option<MixerThread>>,
    /// Held by the controller to keep the mixer thread from ticking.
    pub pause: Mutex<()>,
}

impl Shared {
    pub fn runtime(&self) -> Option<Arc<Runtime>> {
        self.runtime.read().clone()
    }

    /// One iteration of the background mixer.
    fn async_step(&self) -> Step {
        let Some(_paused) = self.pause.try_lock() else {
            return Step::Idle;
        };
        let Some(runtime) = self.runtime() else {
            return Step::Idle;
        };
        let contexts: Vec<Arc<Context>> = self
            .contexts
            .read()
            .values()
            .filter(|c| !c.is_sync() && !c.is_suspended())
            .cloned()
            .collect();
        if contexts.is_empty() {
            return Step::Idle;
        }
        let params = self.settings.tick_params();
        for ctx in contexts {
            if let Err(e) = tick::run(&runtime.mixer, &runtime.store, &ctx, params) {
                self.error.record(&e);
                tracing::warn!(context = %ctx.id(), error = %e, "async tick failed");
            }
        }
        Step::Worked
    }
}

/// The mixing engine.
///
/// Not `Clone`: dropping the engine stops its mixer thread.
pub struct Engine {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("settings", &self.shared.settings)
            .field("contexts", &self.shared.contexts.read().len())
            .field("current", &*self.shared.current.read())
            .field("runtime", &self.shared.runtime.read().is_some())
            .finish_non_exhaustive()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::with_backends(EngineSettings::default(), Vec::new())
    }
}

impl Engine {
    /// Creates an engine with only the null backend.
    pub fn new(settings: EngineSettings) -> Self {
        Self::with_backends(settings, Vec::new())
    }

    /// Creates an engine opening devices through `backends`.
    ///
    /// A paced [`NullBackend`] is always available after the given ones, so
    /// an asynchronous context falling back to it still mixes in real time.
    pub fn with_backends(settings: EngineSettings, mut backends: Vec<Arc<dyn Backend>>) -> Self {
        if !backends.iter().any(|b| b.name() == "null") {
            backends.push(Arc::new(NullBackend::paced()));
        }
        Self {
            shared: Arc::new(Shared {
                settings,
                backends: RwLock::new(backends),
                error: ErrorState::new(),
                registry: ExtensionRegistry::new(),
                contexts: RwLock::new(BTreeMap::new()),
                next_context: AtomicU32::new(1),
                current: RwLock::new(None),
                runtime: RwLock::new(None),
                thread: Mutex::new(None),
                pause: Mutex::new(()),
            }),
        }
    }

    /// Engine settings.
    pub fn settings(&self) -> &EngineSettings {
        &self.shared.settings
    }

    /// Adds a backend, replacing any with the same name.
    pub fn add_backend(&self, backend: Arc<dyn Backend>) {
        let mut backends = self.shared.backends.write();
        backends.retain(|b| b.name() != backend.name());
        backends.insert(0, backend);
    }

    /// Names of the available backends.
    pub fn backend_names(&self) -> Vec<String> {
        self.shared
            .backends
            .read()
            .iter()
            .map(|b| b.name().to_owned())
            .collect()
    }

    /// Returns and clears the first recorded error.
    pub fn take_error(&self) -> Option<Error> {
        self.shared.error.take()
    }

    /// Returns the first recorded error without clearing it.
    pub fn peek_error(&self) -> Option<Error> {
        self.shared.error.peek()
    }

    /// Runs `f` with the background mixer held off.
    pub fn with_mixer_paused<R>(&self, f: impl FnOnce() -> R) -> R {
        let _paused = self.shared.pause.lock();
        f()
    }

    /// Returns true while the background mixer thread runs.
    pub fn is_mixer_thread_running(&self) -> bool {
        self.shared
            .thread
            .lock()
            .as_ref()
            .is_some_and(MixerThread::is_running)
    }

    /// Mix slots currently bound to playing or paused sources.
    pub fn active_mix_sources(&self) -> usize {
        self.shared
            .runtime()
            .map_or(0, |rt| rt.mixer.lock().active())
    }

    /// Canonical interleaved output of the most recent tick.
    pub fn last_mix(&self) -> Vec<i16> {
        self.shared
            .runtime()
            .map_or_else(Vec::new, |rt| rt.mixer.lock().output().to_vec())
    }

    /// Records a failed result in the error state and passes it through.
    fn record<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.shared.error.record(e);
            tracing::debug!(error = %e, "engine call failed");
        }
        result
    }

    fn runtime(&self) -> Result<Arc<Runtime>> {
        self.shared
            .runtime()
            .ok_or(Error::IllegalCommand("no context has been created"))
    }

    fn current(&self) -> Result<(Arc<Runtime>, Arc<Context>)> {
        let id = (*self.shared.current.read())
            .ok_or(Error::IllegalCommand("no current context"))?;
        let ctx = self
            .shared
            .contexts
            .read()
            .get(&id)
            .cloned()
            .ok_or(Error::no_context(id.raw()))?;
        Ok((self.runtime()?, ctx))
    }

    fn ensure_mixer_thread(&self) -> Result<()> {
        let mut thread = self.shared.thread.lock();
        if thread.as_ref().is_some_and(MixerThread::is_running) {
            return Ok(());
        }
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        *thread = Some(MixerThread::spawn(move || match weak.upgrade() {
            Some(shared) => shared.async_step(),
            None => Step::Exit,
        })?);
        Ok(())
    }

    fn stop_mixer_thread(&self) {
        let thread = self.shared.thread.lock().take();
        if let Some(mut thread) = thread {
            thread.shutdown();
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop_mixer_thread();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_validation() {
        assert!(EngineSettings::default().validate().is_ok());
        let bad = EngineSettings {
            speakers: 0,
            ..EngineSettings::default()
        };
        assert_eq!(
            bad.validate(),
            Err(Error::InvalidValue("speaker count must be positive"))
        );
    }

    #[test]
    fn null_backend_always_present() {
        let engine = Engine::default();
        assert_eq!(engine.backend_names(), vec!["null"]);
    }

    #[test]
    fn no_runtime_before_first_context() {
        let engine = Engine::default();
        assert_eq!(engine.active_mix_sources(), 0);
        assert!(engine.last_mix().is_empty());
        assert!(!engine.is_mixer_thread_running());
    }
}
