//! Per-source filters run by the mixer between split and summation.
//!
//! Every context carries a [`FilterTable`] holding up to [`MAX_FILTERS`]
//! filters. Once per tick, for each contributing source, the mixer calls
//! every filter in table order on the source's per-channel scratch.
//!
//! ## Design Decisions
//!
//! - **Scratch in place**: filters rewrite the canonical `i16` scratch; no
//!   extra buffers are allocated per tick.
//! - **Cursor ownership**: a filter that consumes source data at its own
//!   rate (resampling) moves the cursor itself and calls
//!   [`Source::claim_cursor`]; the mixer then leaves the cursor alone.
//! - **Scope**: distance attenuation, pitch and gain are built in. Coning
//!   and doppler are not; applications may insert their own filters.

use crate::Result;
use crate::buffer::Buffer;
use crate::error::Error;
use crate::format::{SAMPLE_BYTES, clamp_i16};
use crate::listener::Listener;
use crate::source::Source;

/// Maximum number of filters per context.
pub const MAX_FILTERS: usize = 8;

/// Attenuation model applied by [`DistanceFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DistanceModel {
    /// No attenuation.
    None,
    /// `ref / (ref + rolloff * (d - ref))`.
    InverseDistance,
    /// As `InverseDistance` with `d` clamped to `[ref, max]`.
    #[default]
    InverseDistanceClamped,
}

impl DistanceModel {
    /// Gain for a source `distance` away.
    pub fn gain(self, distance: f32, reference: f32, max: f32, rolloff: f32) -> f32 {
        let d = match self {
            DistanceModel::None => return 1.0,
            DistanceModel::InverseDistance => distance,
            DistanceModel::InverseDistanceClamped => distance.max(reference).min(max),
        };
        let denom = reference + rolloff * (d - reference);
        if denom <= 0.0 || !denom.is_finite() {
            return 1.0;
        }
        (reference / denom).clamp(0.0, 1.0)
    }
}

/// Context-wide distance parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceParams {
    /// Attenuation model.
    pub model: DistanceModel,
    /// Doppler exaggeration factor.
    pub doppler_factor: f32,
    /// Reference speed for doppler.
    pub doppler_velocity: f32,
}

impl Default for DistanceParams {
    fn default() -> Self {
        Self {
            model: DistanceModel::default(),
            doppler_factor: 1.0,
            doppler_velocity: 1.0,
        }
    }
}

/// Read-only state a filter may consult.
#[derive(Debug, Clone, Copy)]
pub struct FilterContext<'a> {
    /// The context's listener.
    pub listener: &'a Listener,
    /// The context's distance parameters.
    pub distance: DistanceParams,
    /// Canonical mixing rate in Hz.
    pub mix_rate: u32,
    /// Stored buffer queued after the one being read, if any.
    pub next: Option<&'a Buffer>,
}

/// A per-source processing stage.
pub trait Filter: Send {
    /// Name shown in listings.
    fn name(&self) -> &str;

    /// Processes `len` bytes per channel of `scratch` in place.
    ///
    /// # Arguments
    /// * `ctx` - Listener and distance parameters
    /// * `source` - The source being mixed (locked by the mixer)
    /// * `buffer` - The buffer the source is reading
    /// * `scratch` - One vector per buffer channel, at least `len / 2` samples each
    /// * `len` - Bytes per channel requested this tick
    fn apply(
        &mut self,
        ctx: &FilterContext<'_>,
        source: &mut Source,
        buffer: &Buffer,
        scratch: &mut [Vec<i16>],
        len: usize,
    );
}

fn scale(samples: &mut [i16], gain: f32) {
    if (gain - 1.0).abs() < f32::EPSILON {
        return;
    }
    for s in samples {
        *s = clamp_i16((f32::from(*s) * gain).round() as i32);
    }
}

/// Inverse-distance attenuation for mono sources.
#[derive(Debug, Clone, Copy, Default)]
pub struct DistanceFilter;

impl Filter for DistanceFilter {
    fn name(&self) -> &str {
        "distance"
    }

    fn apply(
        &mut self,
        ctx: &FilterContext<'_>,
        source: &mut Source,
        buffer: &Buffer,
        scratch: &mut [Vec<i16>],
        len: usize,
    ) {
        if buffer.channels() != 1 {
            return;
        }
        let pos = source.position();
        let offset = if source.is_relative() {
            pos
        } else {
            let l = ctx.listener.position;
            [pos[0] - l[0], pos[1] - l[1], pos[2] - l[2]]
        };
        let distance = offset.iter().map(|c| c * c).sum::<f32>().sqrt();
        let gain = ctx.distance.model.gain(
            distance,
            source.reference_distance(),
            source.max_distance(),
            source.rolloff_factor(),
        );
        let n = len / SAMPLE_BYTES;
        for channel in scratch.iter_mut() {
            let end = n.min(channel.len());
            scale(&mut channel[..end], gain);
        }
    }
}

/// Linear-interpolation resampler driven by the source's pitch.
///
/// Reads stored buffers directly from the cursor, so it owns cursor
/// advancement whenever pitch differs from 1. A non-looping source reads
/// on into the next queued buffer and leaves the cursor past the end of
/// the current one; the mixer carries the overshoot across.
#[derive(Debug, Clone, Copy, Default)]
pub struct PitchFilter;

impl Filter for PitchFilter {
    fn name(&self) -> &str {
        "pitch"
    }

    fn apply(
        &mut self,
        ctx: &FilterContext<'_>,
        source: &mut Source,
        buffer: &Buffer,
        scratch: &mut [Vec<i16>],
        len: usize,
    ) {
        let pitch = f64::from(source.pitch());
        if (pitch - 1.0).abs() < f64::EPSILON || !buffer.is_stored() {
            return;
        }
        let frames = buffer.size() / SAMPLE_BYTES;
        let wanted = len / SAMPLE_BYTES;
        let looping = source.is_looping() && frames > 0;
        let next = if looping { None } else { ctx.next };
        let start = (source.cursor() / SAMPLE_BYTES) as f64 + source.resample_remainder();

        let mut end = start;
        for (c, channel) in scratch.iter_mut().enumerate() {
            let data = buffer.samples(c);
            let tail = next.map_or(&[][..], |n| n.samples(c % n.channels().max(1)));
            let sample = |i: usize| -> Option<i16> {
                if looping {
                    data.get(i % frames).copied()
                } else if i < frames {
                    data.get(i).copied()
                } else {
                    tail.get(i - frames).copied()
                }
            };
            let mut pos = start;
            for out in channel.iter_mut().take(wanted) {
                if looping {
                    while pos >= frames as f64 {
                        pos -= frames as f64;
                    }
                }
                let idx = pos as usize;
                let Some(a) = sample(idx) else {
                    *out = 0;
                    continue;
                };
                let a = f64::from(a);
                let b = sample(idx + 1).map_or(a, f64::from);
                *out = (a + (b - a) * (pos - idx as f64)).round() as i16;
                pos += pitch;
            }
            end = pos;
        }

        if looping {
            while end >= frames as f64 {
                end -= frames as f64;
            }
        }
        let whole = end.floor();
        let whole_frames = whole as usize;
        if whole_frames < frames {
            source.set_cursor(whole_frames * SAMPLE_BYTES);
            source.set_resample_remainder(end - whole);
        } else if let Some(next) = next {
            let next_frames = next.size() / SAMPLE_BYTES;
            let carry = whole_frames - frames;
            if carry < next_frames {
                source.set_cursor(buffer.size() + carry * SAMPLE_BYTES);
                source.set_resample_remainder(end - whole);
            } else {
                source.set_cursor(buffer.size() + next.size());
                source.set_resample_remainder(0.0);
            }
        } else {
            source.set_cursor(buffer.size());
            source.set_resample_remainder(0.0);
        }
        source.claim_cursor();
    }
}

/// Source gain clamped to its min/max, times the listener gain.
#[derive(Debug, Clone, Copy, Default)]
pub struct GainFilter;

impl Filter for GainFilter {
    fn name(&self) -> &str {
        "gain"
    }

    fn apply(
        &mut self,
        ctx: &FilterContext<'_>,
        source: &mut Source,
        _buffer: &Buffer,
        scratch: &mut [Vec<i16>],
        len: usize,
    ) {
        let gain = source.gain().max(source.min_gain()).min(source.max_gain()) * ctx.listener.gain;
        let n = len / SAMPLE_BYTES;
        for channel in scratch.iter_mut() {
            let end = n.min(channel.len());
            scale(&mut channel[..end], gain);
        }
    }
}

/// Ordered filter pipeline of one context.
pub struct FilterTable {
    filters: Vec<Box<dyn Filter>>,
}

impl std::fmt::Debug for FilterTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl Default for FilterTable {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl FilterTable {
    /// An empty table.
    pub fn empty() -> Self {
        Self {
            filters: Vec::with_capacity(MAX_FILTERS),
        }
    }

    /// Pitch, distance, then gain.
    pub fn with_builtins() -> Self {
        let mut table = Self::empty();
        table.filters.push(Box::new(PitchFilter));
        table.filters.push(Box::new(DistanceFilter));
        table.filters.push(Box::new(GainFilter));
        table
    }

    /// Appends a filter. Fails with `InvalidValue` when the table is full.
    pub fn insert(&mut self, filter: Box<dyn Filter>) -> Result<()> {
        if self.filters.len() >= MAX_FILTERS {
            return Err(Error::InvalidValue("filter table is full"));
        }
        self.filters.push(filter);
        Ok(())
    }

    /// Removes the first filter called `name`.
    pub fn remove(&mut self, name: &str) -> bool {
        match self.filters.iter().position(|f| f.name() == name) {
            Some(i) => {
                self.filters.remove(i);
                true
            }
            None => false,
        }
    }

    /// Filter names in pipeline order.
    pub fn names(&self) -> Vec<String> {
        self.filters.iter().map(|f| f.name().to_owned()).collect()
    }

    /// Number of filters.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Returns true if the table holds no filters.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Runs every filter in order.
    pub fn run(
        &mut self,
        ctx: &FilterContext<'_>,
        source: &mut Source,
        buffer: &Buffer,
        scratch: &mut [Vec<i16>],
        len: usize,
    ) {
        for filter in &mut self.filters {
            filter.apply(ctx, source, buffer, scratch, len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Format;
    use crate::id::{BufferId, SourceId};
    use crate::source::{ParamValue, SourceDefaults, SourceParam};

    fn mono_buffer(samples: Vec<i16>) -> Buffer {
        let mut buffer = Buffer::new(BufferId(1));
        buffer.set_data(vec![samples], Format::Mono16, 44100);
        buffer
    }

    fn ctx(listener: &Listener) -> FilterContext<'_> {
        FilterContext {
            listener,
            distance: DistanceParams::default(),
            mix_rate: 44100,
            next: None,
        }
    }

    #[test]
    fn distance_model_gains() {
        let m = DistanceModel::InverseDistanceClamped;
        assert!((m.gain(0.5, 1.0, 10.0, 1.0) - 1.0).abs() < 1e-6);
        assert!((m.gain(2.0, 1.0, 10.0, 1.0) - 0.5).abs() < 1e-6);
        assert!((m.gain(100.0, 1.0, 10.0, 1.0) - 0.1).abs() < 1e-6);
        assert!((DistanceModel::None.gain(100.0, 1.0, 10.0, 1.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn gain_filter_clamps_to_max_and_applies_listener() {
        let listener = Listener::with_gain(0.5);
        let mut src = Source::new(SourceId(1), SourceDefaults::default());
        src.set(SourceParam::Gain, ParamValue::Float(4.0)).unwrap();
        let buffer = mono_buffer(vec![1000; 4]);
        let mut scratch = vec![vec![1000i16; 4]];
        GainFilter.apply(&ctx(&listener), &mut src, &buffer, &mut scratch, 8);
        assert_eq!(scratch[0], vec![500; 4]);
    }

    #[test]
    fn distance_filter_skips_stereo() {
        let listener = Listener::default();
        let mut src = Source::new(SourceId(1), SourceDefaults::default());
        src.set(SourceParam::Position, ParamValue::Vec3([4.0, 0.0, 0.0]))
            .unwrap();
        let mut stereo = Buffer::new(BufferId(2));
        stereo.set_data(vec![vec![100; 2], vec![100; 2]], Format::Stereo16, 44100);
        let mut scratch = vec![vec![100i16; 2], vec![100i16; 2]];
        DistanceFilter.apply(&ctx(&listener), &mut src, &stereo, &mut scratch, 4);
        assert_eq!(scratch[0], vec![100, 100]);

        let mono = mono_buffer(vec![100; 2]);
        let mut scratch = vec![vec![100i16; 2]];
        DistanceFilter.apply(&ctx(&listener), &mut src, &mono, &mut scratch, 4);
        assert_eq!(scratch[0], vec![25, 25]);
    }

    #[test]
    fn pitch_filter_doubles_step_and_claims_cursor() {
        let listener = Listener::default();
        let mut src = Source::new(SourceId(1), SourceDefaults::default());
        src.set(SourceParam::Pitch, ParamValue::Float(2.0)).unwrap();
        let buffer = mono_buffer((0..16).collect());
        let mut scratch = vec![vec![0i16; 4]];
        PitchFilter.apply(&ctx(&listener), &mut src, &buffer, &mut scratch, 8);
        assert_eq!(scratch[0], vec![0, 2, 4, 6]);
        assert_eq!(src.cursor(), 16);
        assert!(src.filter_advanced);
    }

    #[test]
    fn pitch_filter_runs_off_the_end() {
        let listener = Listener::default();
        let mut src = Source::new(SourceId(1), SourceDefaults::default());
        src.set(SourceParam::Pitch, ParamValue::Float(2.0)).unwrap();
        let buffer = mono_buffer(vec![5; 4]);
        let mut scratch = vec![vec![0i16; 4]];
        PitchFilter.apply(&ctx(&listener), &mut src, &buffer, &mut scratch, 8);
        assert_eq!(scratch[0], vec![5, 5, 0, 0]);
        assert_eq!(src.cursor(), buffer.size());
    }

    #[test]
    fn pitch_filter_reads_into_next_buffer() {
        let listener = Listener::default();
        let mut src = Source::new(SourceId(1), SourceDefaults::default());
        src.set(SourceParam::Pitch, ParamValue::Float(2.0)).unwrap();
        let current = mono_buffer(vec![0, 1, 2, 3]);
        let next = mono_buffer((10..18).collect());
        let fctx = FilterContext {
            next: Some(&next),
            ..ctx(&listener)
        };
        let mut scratch = vec![vec![0i16; 4]];
        PitchFilter.apply(&fctx, &mut src, &current, &mut scratch, 8);
        assert_eq!(scratch[0], vec![0, 2, 10, 12]);
        // Four frames into the next buffer.
        assert_eq!(src.cursor(), current.size() + 4 * SAMPLE_BYTES);
    }

    #[test]
    fn unity_pitch_is_passthrough() {
        let listener = Listener::default();
        let mut src = Source::new(SourceId(1), SourceDefaults::default());
        let buffer = mono_buffer(vec![1, 2, 3, 4]);
        let mut scratch = vec![vec![9i16; 4]];
        PitchFilter.apply(&ctx(&listener), &mut src, &buffer, &mut scratch, 8);
        assert_eq!(scratch[0], vec![9; 4]);
        assert!(!src.filter_advanced);
    }

    #[test]
    fn table_is_bounded() {
        let mut table = FilterTable::with_builtins();
        assert_eq!(table.names(), vec!["pitch", "distance", "gain"]);
        while table.len() < MAX_FILTERS {
            table.insert(Box::new(GainFilter)).unwrap();
        }
        assert_eq!(
            table.insert(Box::new(GainFilter)),
            Err(Error::InvalidValue("filter table is full"))
        );
        assert!(table.remove("pitch"));
        assert!(!table.remove("doppler"));
    }
}
