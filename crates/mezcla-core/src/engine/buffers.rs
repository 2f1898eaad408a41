//! Buffer operations.
//!
//! Buffers belong to the runtime and are shared by every context. Uploads
//! are decoded and converted to the mixing rate before the store lock is
//! taken.

use super::Engine;
use crate::Result;
use crate::buffer::BufferCallback;
use crate::error::Error;
use crate::format::{Format, decode, map_frame, resample};
use crate::id::BufferId;

/// What [`Engine::buffer_info`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    /// Frequency the data was uploaded at.
    pub frequency: u32,
    /// Bits per sample of the upload format.
    pub bits: u32,
    /// Channel count.
    pub channels: usize,
    /// Bytes per channel in the canonical layout.
    pub size: usize,
}

impl Engine {
    /// Creates `n` empty buffers, all or nothing.
    pub fn gen_buffers(&self, n: usize) -> Result<Vec<BufferId>> {
        let result = self
            .runtime()
            .and_then(|rt| rt.store.lock().generate(n));
        self.record(result)
    }

    /// Deletes buffers, all or nothing.
    ///
    /// A buffer still queued on or played by a source disappears from view
    /// at once and is reclaimed when the last source lets go of it.
    pub fn delete_buffers(&self, ids: &[BufferId]) -> Result<()> {
        let result = self.runtime().and_then(|rt| rt.store.lock().delete(ids));
        self.record(result)
    }

    /// Returns true if `id` names a live buffer.
    pub fn is_buffer(&self, id: BufferId) -> bool {
        self.shared
            .runtime()
            .is_some_and(|rt| rt.store.lock().is_buffer(id))
    }

    /// Fills a buffer with `data` in `format` at `frequency` Hz.
    ///
    /// Fails with `IllegalCommand` while a source is playing the buffer.
    pub fn buffer_data(
        &self,
        id: BufferId,
        format: Format,
        data: &[u8],
        frequency: u32,
    ) -> Result<()> {
        let result = self.try_buffer_data(id, format, data, frequency);
        self.record(result)
    }

    fn try_buffer_data(
        &self,
        id: BufferId,
        format: Format,
        data: &[u8],
        frequency: u32,
    ) -> Result<()> {
        let rt = self.runtime()?;
        check_idle(&rt.store.lock(), id)?;
        let channels = self.to_canonical(format, data, frequency)?;
        let mut store = rt.store.lock();
        check_idle(&store, id)?;
        store.require_mut(id)?.set_data(channels, format, frequency);
        Ok(())
    }

    /// Reports a buffer's upload frequency, bit depth, channels and size.
    pub fn buffer_info(&self, id: BufferId) -> Result<BufferInfo> {
        let result = self.runtime().and_then(|rt| {
            let store = rt.store.lock();
            let buffer = store.require(id)?;
            Ok(BufferInfo {
                frequency: buffer.frequency(),
                bits: buffer.format().map_or(16, Format::bits),
                channels: buffer.channels(),
                size: buffer.size(),
            })
        });
        self.record(result)
    }

    /// Appends data to a buffer, turning it into a streaming buffer.
    ///
    /// Returns the canonical bytes per channel appended.
    pub fn buffer_append_data(
        &self,
        id: BufferId,
        format: Format,
        data: &[u8],
        frequency: u32,
    ) -> Result<usize> {
        let result = self.try_buffer_append_data(id, format, data, frequency);
        self.record(result)
    }

    fn try_buffer_append_data(
        &self,
        id: BufferId,
        format: Format,
        data: &[u8],
        frequency: u32,
    ) -> Result<usize> {
        let rt = self.runtime()?;
        rt.store.lock().require(id)?;
        let channels = self.to_canonical(format, data, frequency)?;
        rt.store
            .lock()
            .require_mut(id)?
            .append(channels, format, frequency)
    }

    /// Creates `n` empty streaming buffers.
    pub fn gen_streaming_buffers(&self, n: usize) -> Result<Vec<BufferId>> {
        let result = self.runtime().and_then(|rt| {
            let mut store = rt.store.lock();
            let ids = store.generate(n)?;
            for &id in &ids {
                if let Some(buffer) = store.get_mut(id) {
                    buffer.make_streaming();
                }
            }
            Ok(ids)
        });
        self.record(result)
    }

    /// Attaches a producer to a buffer, discarding stored data.
    ///
    /// The producer is asked for interleaved frames of `format`'s channel
    /// count at the mixing rate.
    pub fn buffer_data_with_callback(
        &self,
        id: BufferId,
        callback: BufferCallback,
        format: Format,
    ) -> Result<()> {
        let mix_rate = self.shared.settings.mix_rate;
        let result = self.runtime().and_then(|rt| {
            let mut store = rt.store.lock();
            check_idle(&store, id)?;
            store.require_mut(id)?.set_callback(callback, format, mix_rate);
            Ok(())
        });
        self.record(result)
    }

    /// Fills a buffer like [`buffer_data`](Self::buffer_data) but stores it
    /// with `internal`'s channel count.
    pub fn buffer_write_data(
        &self,
        id: BufferId,
        format: Format,
        data: &[u8],
        frequency: u32,
        internal: Format,
    ) -> Result<()> {
        let result = self.try_buffer_write_data(id, format, data, frequency, internal);
        self.record(result)
    }

    fn try_buffer_write_data(
        &self,
        id: BufferId,
        format: Format,
        data: &[u8],
        frequency: u32,
        internal: Format,
    ) -> Result<()> {
        let rt = self.runtime()?;
        check_idle(&rt.store.lock(), id)?;
        let decoded = self.to_canonical(format, data, frequency)?;
        let channels = remap_channels(&decoded, internal.channels())?;
        let mut store = rt.store.lock();
        check_idle(&store, id)?;
        store.require_mut(id)?.set_data(channels, internal, frequency);
        Ok(())
    }

    /// Sets whether a streaming buffer discards data once it is played.
    pub fn set_stream_wrap(&self, id: BufferId, wrap: bool) -> Result<()> {
        let result = self.runtime().and_then(|rt| {
            rt.store.lock().require_mut(id)?.set_stream_wrap(wrap);
            Ok(())
        });
        self.record(result)
    }

    fn to_canonical(&self, format: Format, data: &[u8], frequency: u32) -> Result<Vec<Vec<i16>>> {
        if frequency == 0 {
            return Err(Error::InvalidValue("frequency must be positive"));
        }
        let mix_rate = self.shared.settings.mix_rate;
        let channels = decode(format, data)?;
        if frequency == mix_rate {
            return Ok(channels);
        }
        Ok(channels
            .iter()
            .map(|channel| resample(channel, frequency, mix_rate))
            .collect())
    }
}

fn check_idle(store: &crate::store::BufferStore, id: BufferId) -> Result<()> {
    if store.require(id)?.current().is_empty() {
        Ok(())
    } else {
        Err(Error::IllegalCommand("buffer is being played"))
    }
}

/// Maps per-channel data onto `channels` outputs frame by frame.
fn remap_channels(input: &[Vec<i16>], channels: usize) -> Result<Vec<Vec<i16>>> {
    if input.len() == channels {
        return Ok(input.to_vec());
    }
    let frames = input.first().map_or(0, Vec::len);
    let mut out: Vec<Vec<i16>> = Vec::new();
    out.try_reserve_exact(channels)?;
    for _ in 0..channels {
        let mut channel = Vec::new();
        channel.try_reserve_exact(frames)?;
        out.push(channel);
    }
    let mut frame_in = vec![0i16; input.len()];
    let mut frame_out = vec![0i16; channels];
    for f in 0..frames {
        for (s, channel) in frame_in.iter_mut().zip(input) {
            *s = channel[f];
        }
        map_frame(&frame_in, &mut frame_out);
        for (channel, &s) in out.iter_mut().zip(&frame_out) {
            channel.push(s);
        }
    }
    Ok(out)
}
