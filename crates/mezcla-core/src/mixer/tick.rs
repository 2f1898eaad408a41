//! One mixing tick for one context.

use parking_lot::Mutex;

use super::{MixSource, Mixer};
use super::split::{copy_clamped, copy_looping, copy_with_next, deinterleave};
use crate::Result;
use crate::buffer::{CALLBACK_SIZE, CallbackRequest};
use crate::context::Context;
use crate::filter::{FilterContext, FilterTable};
use crate::format::{SAMPLE_BYTES, map_frame};
use crate::id::{ContextId, SourceKey};
use crate::source::{Source, SourceState};
use crate::store::BufferStore;

/// Shape of the canonical mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TickParams {
    pub mix_rate: u32,
    pub speakers: usize,
    pub frames: usize,
}

/// Mixes `ctx` and writes the result to its playback device.
///
/// The mixer lock is released before the device write.
pub(crate) fn run(
    mixer: &Mutex<Mixer>,
    store: &Mutex<BufferStore>,
    ctx: &Context,
    params: TickParams,
) -> Result<()> {
    let mut mixer = mixer.lock();
    mix_context(&mut mixer, store, ctx, params)?;

    let mut output = ctx.output.lock();
    let Some(slot) = output.as_mut() else {
        return Ok(());
    };
    slot.converter.convert_output(
        &mixer.output,
        params.speakers,
        params.mix_rate,
        &mut slot.staging,
    )?;
    drop(mixer);

    if let Err(e) = slot.device.write(&slot.staging) {
        tracing::warn!(context = %ctx.id(), error = %e, "device write failed");
        return Err(e);
    }
    Ok(())
}

/// Fills `mixer.output` with one tick of `ctx`.
pub(crate) fn mix_context(
    mixer: &mut Mixer,
    store: &Mutex<BufferStore>,
    ctx: &Context,
    params: TickParams,
) -> Result<()> {
    let total = params.frames * params.speakers;
    mixer.output.clear();
    mixer.output.try_reserve(total)?;
    mixer.output.resize(total, 0);
    mixer.manager.clear();
    if ctx.is_suspended() {
        return Ok(());
    }

    let listener = ctx.listener();
    let filter_ctx = FilterContext {
        listener: &listener,
        distance: *ctx.distance.lock(),
        mix_rate: params.mix_rate,
        next: None,
    };

    {
        let sources = ctx.sources.read();
        let mut filters = ctx.filters.lock();
        for slot in mixer.pool.ids() {
            let Some(mut entry) = mixer.entry(slot) else {
                continue;
            };
            if entry.destroy_me || entry.key.context != ctx.id() {
                continue;
            }
            let Some(lock) = sources.get(entry.key.source.raw()) else {
                entry.destroy_me = true;
                set_entry(mixer, slot, entry);
                continue;
            };
            let mut src = lock.lock();
            match src.state {
                SourceState::Paused => continue,
                SourceState::Playing => {}
                SourceState::Initial | SourceState::Stopped => {
                    src.mix_slot = None;
                    entry.destroy_me = true;
                    set_entry(mixer, slot, entry);
                    continue;
                }
            }
            let mut store = store.lock();
            let keep = mix_source(
                mixer,
                ctx.id(),
                &mut src,
                &mut store,
                &mut filters,
                &filter_ctx,
                params,
            )?;
            if !keep {
                entry.destroy_me = true;
                set_entry(mixer, slot, entry);
            }
        }
    }

    let doomed: Vec<u32> = mixer
        .pool
        .iter()
        .filter(|(_, e)| e.lock().destroy_me)
        .map(|(id, _)| id)
        .collect();
    for slot in doomed {
        mixer.pool.dealloc(slot, drop);
    }

    if !mixer.stream_advance.is_empty() {
        let mut store = store.lock();
        for (bid, bytes) in std::mem::take(&mut mixer.stream_advance) {
            if let Some(buffer) = store.get_any_mut(bid) {
                buffer.advance_stream(bytes);
            }
        }
    }

    let Mixer {
        manager, output, ..
    } = mixer;
    manager.mix_into(output);
    Ok(())
}

fn set_entry(mixer: &Mixer, slot: u32, value: MixSource) {
    if let Some(entry) = mixer.pool.get(slot) {
        *entry.lock() = value;
    }
}

/// Stops a source the mixer ran out of data for.
fn finish(src: &mut Source, store: &mut BufferStore, key: SourceKey) {
    store.demote(src.queue.current(), key);
    src.state = SourceState::Stopped;
    src.queue.finish();
    src.soundpos = 0;
    src.pitch_frac = 0.0;
    src.mix_slot = None;
    tracing::debug!(source = %key, "source reached end of queue");
}

/// How the split path left the cursor.
enum Cursor {
    /// Already moved (callback and streaming buffers).
    Moved,
    /// Move forward by this many samples unless a filter claims it.
    Advance(usize),
}

/// Splits, filters and contributes one source. Returns false once the
/// source has stopped and its slot should be freed.
fn mix_source(
    mixer: &mut Mixer,
    context: ContextId,
    src: &mut Source,
    store: &mut BufferStore,
    filters: &mut FilterTable,
    filter_ctx: &FilterContext<'_>,
    params: TickParams,
) -> Result<bool> {
    let key = SourceKey::new(context, src.id());
    let bid = src.queue.current();
    let Some(buffer) = store.get_any(bid) else {
        finish(src, store, key);
        return Ok(false);
    };
    let frames = params.frames;
    let len = frames * SAMPLE_BYTES;
    let channels = buffer.channels().max(1);
    let streaming = buffer.is_streaming();
    mixer.ensure_scratch(channels, frames)?;
    src.filter_advanced = false;

    let (got, cursor) = if buffer.is_callback() {
        mixer.callback_buf.clear();
        mixer.callback_buf.try_reserve(frames * channels)?;
        mixer.callback_buf.resize(frames * channels, 0);
        let result = match store.get_any_mut(bid) {
            Some(buffer) => buffer.produce(CallbackRequest {
                source: key,
                buffer: bid,
                channels,
                frequency: params.mix_rate,
                out: &mut mixer.callback_buf[..],
            }),
            None => Ok(0),
        };
        match result {
            Ok(written) => {
                let written = written.min(frames);
                deinterleave(&mixer.callback_buf, channels, written, &mut mixer.scratch);
                for channel in &mut mixer.scratch[..channels] {
                    channel[written..frames].fill(0);
                }
                // A short fill marks the end of the stream.
                src.soundpos = if written < frames {
                    CALLBACK_SIZE
                } else {
                    src.soundpos.saturating_add(len)
                };
                (written, Cursor::Moved)
            }
            Err(e) => {
                tracing::warn!(source = %key, buffer = %bid, error = %e, "buffer callback failed");
                for channel in &mut mixer.scratch[..channels] {
                    channel[..frames].fill(0);
                }
                finish(src, store, key);
                return Ok(false);
            }
        }
    } else if streaming {
        let pos = buffer.stream_position() / SAMPLE_BYTES;
        let mut n = 0;
        for (c, channel) in mixer.scratch[..channels].iter_mut().enumerate() {
            n = copy_clamped(buffer.samples(c), pos, &mut channel[..frames]);
        }
        let consumed = mixer.stream_advance.entry(bid).or_insert(0);
        *consumed = (*consumed).max(n * SAMPLE_BYTES);
        (n, Cursor::Moved)
    } else {
        let pos = src.soundpos / SAMPLE_BYTES;
        let size = buffer.size() / SAMPLE_BYTES;
        let remaining = size.saturating_sub(pos);
        let looping = src.is_looping() && size > 0;
        let next = src
            .queue
            .next()
            .and_then(|next| store.get_any(next))
            .filter(|next| next.is_stored());
        let mut n = 0;
        for (c, channel) in mixer.scratch[..channels].iter_mut().enumerate() {
            let out = &mut channel[..frames];
            let data = buffer.samples(c);
            n = if remaining >= frames {
                copy_clamped(data, pos, out)
            } else if looping {
                copy_looping(data, pos, out);
                frames
            } else if let Some(next) = next {
                copy_with_next(data, pos, next.samples(c % next.channels().max(1)), out)
            } else {
                copy_clamped(data, pos, out)
            };
        }
        // Across a queue boundary the cursor still moves the full length;
        // the carry into the next buffer is applied on exhaustion.
        let advance = if remaining >= frames || looping || next.is_some() {
            frames
        } else {
            remaining
        };
        (n, Cursor::Advance(advance))
    };

    let Some(buffer) = store.get_any(bid) else {
        finish(src, store, key);
        return Ok(false);
    };
    let next = src
        .queue
        .next()
        .and_then(|next| store.get_any(next))
        .filter(|next| next.is_stored());
    let source_ctx = FilterContext {
        next,
        ..*filter_ctx
    };
    filters.run(&source_ctx, src, buffer, &mut mixer.scratch[..channels], len);
    if let Cursor::Advance(samples) = cursor
        && !src.filter_advanced
    {
        src.soundpos += samples * SAMPLE_BYTES;
    }

    let produced = if src.filter_advanced { frames } else { got };
    if produced > 0 {
        contribute(mixer, channels, produced, params)?;
    }

    if streaming {
        return Ok(true);
    }
    Ok(handle_exhaustion(src, store, key))
}

/// Interleaves scratch into a new Mix Manager entry at the speaker layout.
fn contribute(mixer: &mut Mixer, channels: usize, produced: usize, params: TickParams) -> Result<()> {
    let speakers = params.speakers;
    let Mixer {
        manager,
        scratch,
        frame,
        ..
    } = mixer;
    frame.clear();
    frame.resize(channels, 0);
    let entry = manager.next_entry(params.frames * speakers)?;
    for f in 0..produced {
        for (c, s) in frame.iter_mut().enumerate() {
            *s = scratch[c][f];
        }
        map_frame(&frame[..], &mut entry[f * speakers..(f + 1) * speakers]);
    }
    Ok(())
}

/// Loops, advances the queue or stops the source once the cursor passes
/// the end of its buffer. Returns false if the source stopped.
fn handle_exhaustion(src: &mut Source, store: &mut BufferStore, key: SourceKey) -> bool {
    loop {
        let current = src.queue.current();
        let Some(buffer) = store.get_any(current) else {
            finish(src, store, key);
            return false;
        };
        let size = buffer.size();
        if src.soundpos < size {
            return true;
        }
        if src.is_looping() && size > 0 {
            src.soundpos %= size;
            return true;
        }
        let carry = src.soundpos - size;
        if !src.queue.advance() {
            finish(src, store, key);
            return false;
        }
        store.demote(current, key);
        store.promote(src.queue.current(), key);
        src.soundpos = carry;
        tracing::trace!(source = %key, buffer = %src.queue.current(), "queue advanced");
    }
}
