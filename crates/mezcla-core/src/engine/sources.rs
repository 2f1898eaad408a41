//! Source operations on the current context.
//!
//! Batch operations validate every id before mutating anything. Locks are
//! taken in mixer → source pool → source slot → buffer store order.

use super::Engine;
use crate::Result;
use crate::error::Error;
use crate::format::SAMPLE_BYTES;
use crate::id::{BufferId, SourceId, SourceKey};
use crate::mixer::Mixer;
use crate::source::{ParamValue, QueueState, Source, SourceParam, SourceState, Transition};
use crate::store::BufferStore;

/// Drops every buffer reference `src` holds.
pub(super) fn release_references(src: &Source, key: SourceKey, store: &mut BufferStore) {
    store.demote(src.queue.current(), key);
    for buffer in src.queue.buffers() {
        store.detach(buffer, key);
    }
}

impl Engine {
    /// Creates `n` sources in the current context, all or nothing.
    pub fn gen_sources(&self, n: usize) -> Result<Vec<SourceId>> {
        let result = self.try_gen_sources(n);
        self.record(result)
    }

    fn try_gen_sources(&self, n: usize) -> Result<Vec<SourceId>> {
        let (_, ctx) = self.current()?;
        let defaults = self.shared.settings.source_defaults;
        let mut pool = ctx.sources.write();
        let wanted = pool
            .len()
            .checked_add(n)
            .ok_or(Error::InvalidValue("source count overflows"))?;
        pool.resize(wanted)?;

        let mut ids = Vec::new();
        ids.try_reserve_exact(n)?;
        for _ in 0..n {
            match pool.alloc_with(|id| Source::new(SourceId(id), defaults)) {
                Ok(id) => ids.push(SourceId(id)),
                Err(e) => {
                    for id in &ids {
                        pool.dealloc(id.raw(), drop);
                    }
                    return Err(e);
                }
            }
        }
        tracing::debug!(context = %ctx.id(), count = n, "sources generated");
        Ok(ids)
    }

    /// Deletes sources, releasing their buffer references.
    ///
    /// Fails without deleting anything if an id is unknown (`InvalidName`)
    /// or a source is playing or paused (`IllegalCommand`).
    pub fn delete_sources(&self, ids: &[SourceId]) -> Result<()> {
        let result = self.try_delete_sources(ids);
        self.record(result)
    }

    fn try_delete_sources(&self, ids: &[SourceId]) -> Result<()> {
        let (rt, ctx) = self.current()?;
        let mut pool = ctx.sources.write();
        for &id in ids {
            let src = pool.get(id.raw()).ok_or(Error::no_source(id.raw()))?;
            if src.lock().state().is_active() {
                return Err(Error::IllegalCommand("cannot delete a playing source"));
            }
        }
        let mut store = rt.store.lock();
        for &id in ids {
            let key = SourceKey::new(ctx.id(), id);
            pool.dealloc(id.raw(), |src| release_references(&src, key, &mut store));
        }
        tracing::debug!(context = %ctx.id(), count = ids.len(), "sources deleted");
        Ok(())
    }

    /// Returns true if `id` names a source in the current context.
    pub fn is_source(&self, id: SourceId) -> bool {
        self.current()
            .is_ok_and(|(_, ctx)| ctx.sources.read().contains(id.raw()))
    }

    /// Sets a source attribute.
    ///
    /// `Buffer` replaces the whole queue and is only allowed while the
    /// source is `Initial` or `Stopped`. `ByteOffset` moves the cursor
    /// within the current stored buffer.
    pub fn set_source(&self, id: SourceId, param: SourceParam, value: ParamValue) -> Result<()> {
        let result = self.try_set_source(id, param, value);
        self.record(result)
    }

    fn try_set_source(&self, id: SourceId, param: SourceParam, value: ParamValue) -> Result<()> {
        let (rt, ctx) = self.current()?;
        let pool = ctx.sources.read();
        let mut src = pool.get(id.raw()).ok_or(Error::no_source(id.raw()))?.lock();
        let key = SourceKey::new(ctx.id(), id);
        match param {
            SourceParam::Buffer => {
                let bid = value.as_buffer()?;
                if src.state().is_active() {
                    return Err(Error::IllegalCommand(
                        "buffer cannot change while the source is playing",
                    ));
                }
                let mut store = rt.store.lock();
                let callback = if bid.is_none() {
                    false
                } else {
                    store.require(bid)?.is_callback()
                };
                let old = src.queue.set_single(bid, QueueState { callback });
                for buffer in old {
                    store.detach(buffer, key);
                }
                store.attach(bid, key);
                src.reset_playback();
                Ok(())
            }
            SourceParam::ByteOffset => {
                let offset = usize::try_from(value.as_int()?)
                    .map_err(|_| Error::InvalidValue("byte offset is negative"))?;
                let store = rt.store.lock();
                let buffer = store
                    .get_any(src.queue.current())
                    .ok_or(Error::IllegalCommand("source has no buffer"))?;
                if !buffer.is_stored() {
                    return Err(Error::IllegalCommand("byte offset needs a stored buffer"));
                }
                if offset > buffer.size() {
                    return Err(Error::InvalidValue("byte offset past end of buffer"));
                }
                src.soundpos = offset - offset % SAMPLE_BYTES;
                src.pitch_frac = 0.0;
                Ok(())
            }
            _ => src.set(param, value),
        }
    }

    /// Reads a source attribute.
    ///
    /// `ByteOffset` on a streaming buffer reports the stream position.
    pub fn get_source(&self, id: SourceId, param: SourceParam) -> Result<ParamValue> {
        let result = self.try_get_source(id, param);
        self.record(result)
    }

    fn try_get_source(&self, id: SourceId, param: SourceParam) -> Result<ParamValue> {
        let (rt, ctx) = self.current()?;
        let pool = ctx.sources.read();
        let src = pool.get(id.raw()).ok_or(Error::no_source(id.raw()))?.lock();
        if param == SourceParam::ByteOffset {
            let store = rt.store.lock();
            if let Some(buffer) = store.get_any(src.queue.current())
                && buffer.is_streaming()
            {
                return Ok(ParamValue::Int(buffer.stream_position() as i64));
            }
        }
        Ok(src.get(param))
    }

    /// Returns true if the attribute was explicitly set on the source.
    pub fn is_source_param_set(&self, id: SourceId, param: SourceParam) -> Result<bool> {
        let result = self.with_source(id, |src| src.is_set(param));
        self.record(result)
    }

    /// Play state of a source.
    pub fn source_state(&self, id: SourceId) -> Result<SourceState> {
        let result = self.with_source(id, Source::state);
        self.record(result)
    }

    /// Cursor of a source in bytes per channel into its current buffer.
    pub fn source_cursor(&self, id: SourceId) -> Result<usize> {
        let result = self.with_source(id, Source::cursor);
        self.record(result)
    }

    fn with_source<T>(&self, id: SourceId, f: impl FnOnce(&Source) -> T) -> Result<T> {
        let (_, ctx) = self.current()?;
        let pool = ctx.sources.read();
        let src = pool.get(id.raw()).ok_or(Error::no_source(id.raw()))?.lock();
        Ok(f(&src))
    }

    /// Starts or resumes a source.
    ///
    /// Starting from `Initial` or `Stopped` needs a buffer; without one
    /// this fails with `IllegalCommand` and the state is unchanged.
    pub fn play_source(&self, id: SourceId) -> Result<()> {
        self.play_sources(&[id])
    }

    /// Pauses a playing source.
    pub fn pause_source(&self, id: SourceId) -> Result<()> {
        self.pause_sources(&[id])
    }

    /// Stops a playing or paused source.
    pub fn stop_source(&self, id: SourceId) -> Result<()> {
        self.stop_sources(&[id])
    }

    /// Stops a source and returns it to `Initial`.
    pub fn rewind_source(&self, id: SourceId) -> Result<()> {
        self.rewind_sources(&[id])
    }

    /// Batch [`play_source`](Self::play_source).
    pub fn play_sources(&self, ids: &[SourceId]) -> Result<()> {
        let result = self.transition(ids, Transition::Play);
        self.record(result)
    }

    /// Batch [`pause_source`](Self::pause_source).
    pub fn pause_sources(&self, ids: &[SourceId]) -> Result<()> {
        let result = self.transition(ids, Transition::Pause);
        self.record(result)
    }

    /// Batch [`stop_source`](Self::stop_source).
    pub fn stop_sources(&self, ids: &[SourceId]) -> Result<()> {
        let result = self.transition(ids, Transition::Stop);
        self.record(result)
    }

    /// Batch [`rewind_source`](Self::rewind_source).
    pub fn rewind_sources(&self, ids: &[SourceId]) -> Result<()> {
        let result = self.transition(ids, Transition::Rewind);
        self.record(result)
    }

    fn transition(&self, ids: &[SourceId], op: Transition) -> Result<()> {
        let (rt, ctx) = self.current()?;
        let mut mixer = rt.mixer.lock();
        let pool = ctx.sources.read();

        for &id in ids {
            let src = pool.get(id.raw()).ok_or(Error::no_source(id.raw()))?.lock();
            if op == Transition::Play && !src.state().is_active() && !src.queue.has_buffer() {
                return Err(Error::IllegalCommand("source has no buffer"));
            }
        }

        for &id in ids {
            let Some(slot) = pool.get(id.raw()) else {
                continue;
            };
            let mut src = slot.lock();
            let mut store = rt.store.lock();
            apply(&mut mixer, &mut src, &mut store, SourceKey::new(ctx.id(), id), op)?;
        }
        Ok(())
    }

    /// Appends buffers to a source's queue.
    ///
    /// Every buffer id is validated before the queue changes.
    pub fn queue_buffers(&self, id: SourceId, buffers: &[BufferId]) -> Result<()> {
        let result = self.try_queue_buffers(id, buffers);
        self.record(result)
    }

    fn try_queue_buffers(&self, id: SourceId, buffers: &[BufferId]) -> Result<()> {
        let (rt, ctx) = self.current()?;
        let pool = ctx.sources.read();
        let mut src = pool.get(id.raw()).ok_or(Error::no_source(id.raw()))?.lock();
        let mut store = rt.store.lock();
        let mut states = Vec::new();
        states.try_reserve_exact(buffers.len())?;
        for &bid in buffers {
            let buffer = store.require(bid)?;
            states.push(QueueState {
                callback: buffer.is_callback(),
            });
        }
        let key = SourceKey::new(ctx.id(), id);
        for (&bid, state) in buffers.iter().zip(states) {
            src.queue.append(bid, state)?;
            store.attach(bid, key);
        }
        Ok(())
    }

    /// Removes `n` processed buffers from the front of a source's queue.
    ///
    /// Fails with `InvalidValue` if fewer than `n` are processed.
    pub fn unqueue_buffers(&self, id: SourceId, n: usize) -> Result<Vec<BufferId>> {
        let result = self.try_unqueue_buffers(id, n);
        self.record(result)
    }

    fn try_unqueue_buffers(&self, id: SourceId, n: usize) -> Result<Vec<BufferId>> {
        let (rt, ctx) = self.current()?;
        let pool = ctx.sources.read();
        let mut src = pool.get(id.raw()).ok_or(Error::no_source(id.raw()))?.lock();
        let removed = src.queue.unqueue(n)?;
        let key = SourceKey::new(ctx.id(), id);
        let mut store = rt.store.lock();
        for &bid in &removed {
            store.detach(bid, key);
        }
        Ok(removed)
    }
}

/// Applies one transition's side effects and moves the state.
fn apply(
    mixer: &mut Mixer,
    src: &mut Source,
    store: &mut BufferStore,
    key: SourceKey,
    op: Transition,
) -> Result<()> {
    let from = src.state;
    match (from, op) {
        (SourceState::Initial | SourceState::Stopped, Transition::Play) => {
            src.reset_playback();
            src.mix_slot = Some(mixer.add_source(key)?);
            store.promote(src.queue.current(), key);
        }
        (SourceState::Playing | SourceState::Paused, Transition::Stop) => {
            release_slot(mixer, src);
            store.demote(src.queue.current(), key);
            src.queue.finish();
            src.soundpos = 0;
            src.pitch_frac = 0.0;
        }
        (SourceState::Playing | SourceState::Paused, Transition::Rewind) => {
            release_slot(mixer, src);
            store.demote(src.queue.current(), key);
            src.reset_playback();
        }
        _ => {}
    }
    src.state = from.after(op);
    if src.state != from {
        tracing::debug!(source = %key, ?from, to = ?src.state, "source transition");
    }
    Ok(())
}

fn release_slot(mixer: &mut Mixer, src: &mut Source) {
    if let Some(slot) = src.mix_slot.take() {
        mixer.remove_source(slot);
    }
}
