//! Buffers: canonical PCM storage plus queued/current reference sets.

use std::collections::BTreeMap;
use std::fmt;

use crate::Result;
use crate::error::Error;
use crate::format::{Format, SAMPLE_BYTES};
use crate::id::{BufferId, SourceKey};

/// Reported size of a callback-fed buffer, which has no stored end.
pub const CALLBACK_SIZE: usize = usize::MAX;

/// Failure returned by a buffer producer callback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("buffer callback failed: {0}")]
pub struct CallbackError(pub String);

/// One request made to a buffer producer.
pub struct CallbackRequest<'a> {
    /// Source being mixed.
    pub source: SourceKey,
    /// Buffer the callback is attached to.
    pub buffer: BufferId,
    /// Interleaved channels expected in `out`.
    pub channels: usize,
    /// Sample rate expected in `out`.
    pub frequency: u32,
    /// Interleaved output; `out.len() / channels` frames are wanted.
    pub out: &'a mut [i16],
}

/// Produces PCM on demand. Returns the number of frames written.
///
/// Returning fewer frames than requested marks the end of the stream.
pub type BufferCallback =
    Box<dyn FnMut(CallbackRequest<'_>) -> std::result::Result<usize, CallbackError> + Send>;

/// Counted set of source references.
///
/// The same source may hold a buffer more than once (e.g. queued twice), so
/// each key carries a count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefSet {
    counts: BTreeMap<SourceKey, u32>,
}

impl RefSet {
    /// Adds one reference for `key`.
    pub fn insert(&mut self, key: SourceKey) {
        *self.counts.entry(key).or_insert(0) += 1;
    }

    /// Drops one reference for `key`. Returns false if `key` held none.
    pub fn remove(&mut self, key: SourceKey) -> bool {
        match self.counts.get_mut(&key) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                self.counts.remove(&key);
                true
            }
            None => false,
        }
    }

    /// Number of references held by `key`.
    pub fn count(&self, key: SourceKey) -> u32 {
        self.counts.get(&key).copied().unwrap_or(0)
    }

    /// Returns true if `key` holds at least one reference.
    pub fn contains(&self, key: SourceKey) -> bool {
        self.counts.contains_key(&key)
    }

    /// Total references across all keys.
    pub fn total(&self) -> u32 {
        self.counts.values().sum()
    }

    /// Returns true if no references are held.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Distinct sources holding references.
    pub fn keys(&self) -> impl Iterator<Item = SourceKey> + '_ {
        self.counts.keys().copied()
    }
}

/// Buffer state flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferFlags {
    /// Data keeps arriving through appends.
    pub streaming: bool,
    /// Consumed stream data is discarded so positions wrap back to 0.
    pub stream_wrap: bool,
    /// PCM is produced by a callback.
    pub callback: bool,
    /// Deleted by the application while still referenced.
    pub pending_delete: bool,
}

/// PCM sample storage shared by sources across contexts.
pub struct Buffer {
    id: BufferId,
    data: Vec<Vec<i16>>,
    format: Option<Format>,
    frequency: u32,
    streampos: usize,
    appendpos: usize,
    flags: BufferFlags,
    callback: Option<BufferCallback>,
    callback_channels: usize,
    pub(crate) queued: RefSet,
    pub(crate) current: RefSet,
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("channels", &self.channels())
            .field("size", &self.size())
            .field("format", &self.format)
            .field("frequency", &self.frequency)
            .field("flags", &self.flags)
            .field("queued", &self.queued)
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

impl Buffer {
    pub(crate) fn new(id: BufferId) -> Self {
        Self {
            id,
            data: Vec::new(),
            format: None,
            frequency: 0,
            streampos: 0,
            appendpos: 0,
            flags: BufferFlags::default(),
            callback: None,
            callback_channels: 0,
            queued: RefSet::default(),
            current: RefSet::default(),
        }
    }

    /// Buffer id.
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Channels of canonical data (or of the callback's output).
    pub fn channels(&self) -> usize {
        if self.flags.callback {
            self.callback_channels
        } else {
            self.data.len()
        }
    }

    /// Bytes per channel of canonical data; [`CALLBACK_SIZE`] for callback buffers.
    pub fn size(&self) -> usize {
        if self.flags.callback {
            return CALLBACK_SIZE;
        }
        self.data.first().map_or(0, Vec::len) * SAMPLE_BYTES
    }

    /// Format of the most recent upload.
    pub fn format(&self) -> Option<Format> {
        self.format
    }

    /// Frequency of the most recent upload, in Hz.
    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    /// Current flags.
    pub fn flags(&self) -> BufferFlags {
        self.flags
    }

    /// Returns true for streaming buffers.
    pub fn is_streaming(&self) -> bool {
        self.flags.streaming
    }

    /// Returns true for callback-fed buffers.
    pub fn is_callback(&self) -> bool {
        self.flags.callback
    }

    /// Returns true if the buffer holds ordinary stored data.
    pub fn is_stored(&self) -> bool {
        !self.flags.streaming && !self.flags.callback
    }

    /// Bytes per channel consumed from a streaming buffer.
    pub fn stream_position(&self) -> usize {
        self.streampos
    }

    /// Bytes per channel appended to a streaming buffer.
    pub fn append_position(&self) -> usize {
        self.appendpos
    }

    /// Canonical samples of one channel.
    pub fn samples(&self, channel: usize) -> &[i16] {
        self.data.get(channel).map_or(&[], Vec::as_slice)
    }

    /// Sources that have this buffer queued.
    pub fn queued(&self) -> &RefSet {
        &self.queued
    }

    /// Sources currently playing this buffer.
    pub fn current(&self) -> &RefSet {
        &self.current
    }

    /// Returns true while any source references the buffer.
    pub fn is_referenced(&self) -> bool {
        !self.queued.is_empty() || !self.current.is_empty()
    }

    pub(crate) fn mark_pending_delete(&mut self) {
        self.flags.pending_delete = true;
    }

    pub(crate) fn set_stream_wrap(&mut self, wrap: bool) {
        self.flags.stream_wrap = wrap;
    }

    /// Replaces the contents with already-canonical channels.
    pub(crate) fn set_data(&mut self, data: Vec<Vec<i16>>, format: Format, frequency: u32) {
        let size = data.first().map_or(0, Vec::len) * SAMPLE_BYTES;
        self.data = data;
        self.format = Some(format);
        self.frequency = frequency;
        self.streampos = 0;
        self.appendpos = size;
        self.flags.streaming = false;
        self.flags.callback = false;
        self.callback = None;
        self.callback_channels = 0;
    }

    /// Appends canonical channels and marks the buffer streaming.
    ///
    /// Returns the bytes per channel appended.
    pub(crate) fn append(
        &mut self,
        data: Vec<Vec<i16>>,
        format: Format,
        frequency: u32,
    ) -> Result<usize> {
        if self.flags.callback {
            return Err(Error::IllegalCommand("cannot append to a callback buffer"));
        }
        if !self.data.is_empty() && self.data.len() != data.len() {
            return Err(Error::InvalidValue("appended channel count differs"));
        }
        let frames = data.first().map_or(0, Vec::len);
        if self.data.is_empty() {
            self.data = data;
        } else {
            for (dst, src) in self.data.iter_mut().zip(data) {
                dst.try_reserve(src.len())?;
                dst.extend_from_slice(&src);
            }
        }
        let bytes = frames * SAMPLE_BYTES;
        self.format = Some(format);
        self.frequency = frequency;
        self.appendpos += bytes;
        self.flags.streaming = true;
        Ok(bytes)
    }

    /// Turns the buffer into an empty streaming buffer.
    pub(crate) fn make_streaming(&mut self) {
        self.data.clear();
        self.streampos = 0;
        self.appendpos = 0;
        self.flags.streaming = true;
        self.flags.callback = false;
        self.callback = None;
    }

    /// Attaches a producer, discarding stored data.
    pub(crate) fn set_callback(
        &mut self,
        callback: BufferCallback,
        format: Format,
        frequency: u32,
    ) {
        self.data.clear();
        self.format = Some(format);
        self.frequency = frequency;
        self.streampos = 0;
        self.appendpos = 0;
        self.flags.streaming = false;
        self.flags.callback = true;
        self.callback = Some(callback);
        self.callback_channels = format.channels();
    }

    /// Runs the producer for `request`.
    pub(crate) fn produce(
        &mut self,
        request: CallbackRequest<'_>,
    ) -> std::result::Result<usize, CallbackError> {
        match self.callback.as_mut() {
            Some(callback) => callback(request),
            None => Err(CallbackError("no callback attached".into())),
        }
    }

    /// Stream bytes available to read.
    pub(crate) fn stream_available(&self) -> usize {
        self.size().saturating_sub(self.streampos)
    }

    /// Moves the stream position forward, discarding consumed data when
    /// stream wrap is set.
    pub(crate) fn advance_stream(&mut self, bytes: usize) {
        self.streampos = (self.streampos + bytes).min(self.size());
        if self.flags.stream_wrap && self.streampos > 0 {
            let consumed = self.streampos / SAMPLE_BYTES;
            for channel in &mut self.data {
                channel.drain(..consumed.min(channel.len()));
            }
            self.appendpos -= self.streampos;
            self.streampos = 0;
        }
    }
}
