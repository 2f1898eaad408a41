//! PCM formats and conversion to and from the canonical mixing format.
//!
//! Internally every buffer is stored as signed 16-bit samples, one `Vec<i16>`
//! per channel, at the engine's mixing rate. Lengths and cursors throughout
//! the engine are measured in bytes per channel of that canonical layout
//! (so always a multiple of [`SAMPLE_BYTES`]).
//!
//! This module converts application data into that layout when buffers are
//! filled, and converts the mixer's interleaved output into whatever the
//! device negotiated before each write.

use crate::Result;
use crate::error::Error;

/// Bytes per canonical sample.
pub const SAMPLE_BYTES: usize = 2;

/// Application-facing PCM layouts accepted by buffer uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// 8-bit unsigned mono.
    Mono8,
    /// 16-bit signed little-endian mono.
    Mono16,
    /// 8-bit unsigned interleaved stereo.
    Stereo8,
    /// 16-bit signed little-endian interleaved stereo.
    Stereo16,
    /// 32-bit float little-endian mono.
    MonoFloat32,
    /// 32-bit float little-endian interleaved stereo.
    StereoFloat32,
}

impl Format {
    /// Number of interleaved channels.
    pub const fn channels(self) -> usize {
        match self {
            Format::Mono8 | Format::Mono16 | Format::MonoFloat32 => 1,
            Format::Stereo8 | Format::Stereo16 | Format::StereoFloat32 => 2,
        }
    }

    /// Bytes per sample of one channel.
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            Format::Mono8 | Format::Stereo8 => 1,
            Format::Mono16 | Format::Stereo16 => 2,
            Format::MonoFloat32 | Format::StereoFloat32 => 4,
        }
    }

    /// Bits per sample of one channel.
    pub const fn bits(self) -> u32 {
        (self.bytes_per_sample() * 8) as u32
    }

    /// Bytes per interleaved frame.
    pub const fn frame_bytes(self) -> usize {
        self.channels() * self.bytes_per_sample()
    }

    /// Picks the integer format for a channel count and bit depth.
    pub fn from_layout(channels: usize, bits: u32) -> Option<Format> {
        match (channels, bits) {
            (1, 8) => Some(Format::Mono8),
            (1, 16) => Some(Format::Mono16),
            (2, 8) => Some(Format::Stereo8),
            (2, 16) => Some(Format::Stereo16),
            (1, 32) => Some(Format::MonoFloat32),
            (2, 32) => Some(Format::StereoFloat32),
            _ => None,
        }
    }
}

/// Sample encoding of a device stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SampleFormat {
    /// Signed 16-bit little-endian.
    #[default]
    I16,
    /// 32-bit float little-endian in `[-1.0, 1.0]`.
    F32,
}

impl SampleFormat {
    /// Bytes per sample.
    pub const fn bytes(self) -> usize {
        match self {
            SampleFormat::I16 => 2,
            SampleFormat::F32 => 4,
        }
    }
}

/// Decodes interleaved bytes in `format` into per-channel 16-bit samples.
///
/// Trailing bytes that do not form a whole frame are rejected.
pub fn decode(format: Format, data: &[u8]) -> Result<Vec<Vec<i16>>> {
    let frame = format.frame_bytes();
    if data.len() % frame != 0 {
        return Err(Error::InvalidValue("data length is not a whole number of frames"));
    }
    let frames = data.len() / frame;
    let channels = format.channels();
    let mut out: Vec<Vec<i16>> = Vec::with_capacity(channels);
    for _ in 0..channels {
        let mut ch = Vec::new();
        ch.try_reserve_exact(frames)?;
        out.push(ch);
    }

    let width = format.bytes_per_sample();
    for chunk in data.chunks_exact(frame) {
        for (c, sample) in chunk.chunks_exact(width).enumerate() {
            let value = match width {
                1 => (i16::from(sample[0]) - 128) << 8,
                2 => i16::from_le_bytes([sample[0], sample[1]]),
                _ => {
                    let f = f32::from_le_bytes([sample[0], sample[1], sample[2], sample[3]]);
                    f32_to_i16(f)
                }
            };
            out[c].push(value);
        }
    }
    Ok(out)
}

/// Converts a float sample to 16-bit with clamping.
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16
}

/// Converts a 16-bit sample to float in `[-1.0, 1.0]`.
#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / f32::from(i16::MAX)
}

/// Clamps an accumulated sum to the 16-bit signed range.
#[inline]
pub fn clamp_i16(sum: i32) -> i16 {
    sum.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

/// Resamples one channel from `from` Hz to `to` Hz with linear interpolation.
pub fn resample(input: &[i16], from: u32, to: u32) -> Vec<i16> {
    if from == to || input.is_empty() || from == 0 || to == 0 {
        return input.to_vec();
    }
    let out_len = ((input.len() as u64 * u64::from(to)) / u64::from(from)).max(1) as usize;
    let step = f64::from(from) / f64::from(to);
    let last = input.len() - 1;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = pos as usize;
            if idx >= last {
                return input[last];
            }
            let frac = pos - idx as f64;
            let a = f64::from(input[idx]);
            let b = f64::from(input[idx + 1]);
            (a + (b - a) * frac).round() as i16
        })
        .collect()
}

/// Picks the input channel feeding output channel `out` when mapping
/// `in_channels` onto more (or equally many) output channels.
#[inline]
pub fn source_channel(out: usize, in_channels: usize) -> usize {
    out % in_channels.max(1)
}

/// Writes one output frame of `out_channels` samples from an input frame.
///
/// Mono fans out to every output; many-to-one averages; otherwise output `i`
/// takes input `i` (wrapping when there are more outputs than inputs).
#[inline]
pub fn map_frame(input: &[i16], out: &mut [i16]) {
    let in_channels = input.len();
    if in_channels == 0 {
        out.fill(0);
        return;
    }
    if out.len() == 1 && in_channels > 1 {
        let sum: i32 = input.iter().map(|&s| i32::from(s)).sum();
        out[0] = (sum / in_channels as i32) as i16;
        return;
    }
    for (i, o) in out.iter_mut().enumerate() {
        *o = input[source_channel(i, in_channels)];
    }
}

/// Converts the mixer's interleaved canonical output into device bytes.
///
/// One converter lives with each playback device. Rate conversion is
/// linear and continuous across calls: the read position and the last
/// input frame carry over, so block edges neither drop fractional frames
/// nor restart the interpolation. Output block lengths therefore vary by
/// one frame from call to call.
#[derive(Debug, Clone)]
pub struct OutputConverter {
    channels: usize,
    rate: u32,
    format: SampleFormat,
    /// Read position in frames; 0 is `prev`, `i > 0` is input frame `i - 1`.
    pos: f64,
    /// Last input frame of the previous call.
    prev: Vec<i16>,
    frame_in: Vec<i16>,
    frame_out: Vec<i16>,
}

impl OutputConverter {
    /// A converter producing `channels` channels of `format` at `rate` Hz.
    pub fn new(channels: usize, rate: u32, format: SampleFormat) -> Self {
        Self {
            channels,
            rate,
            format,
            pos: 1.0,
            prev: Vec::new(),
            frame_in: Vec::new(),
            frame_out: vec![0; channels],
        }
    }

    /// Converts `input` (`in_channels`-interleaved at `in_rate`) into `dest`,
    /// which is cleared first.
    pub fn convert_output(
        &mut self,
        input: &[i16],
        in_channels: usize,
        in_rate: u32,
        dest: &mut Vec<u8>,
    ) -> Result<()> {
        dest.clear();
        if in_channels == 0 || self.channels == 0 {
            return Ok(());
        }
        if self.prev.len() != in_channels {
            self.prev = vec![0; in_channels];
            self.pos = 1.0;
        }
        let in_frames = input.len() / in_channels;
        let Self {
            channels,
            rate,
            format,
            pos,
            prev,
            frame_in,
            frame_out,
        } = self;
        frame_in.resize(in_channels, 0);
        frame_out.resize(*channels, 0);
        let frame_bytes = *channels * format.bytes();

        if in_rate == *rate || in_rate == 0 || *rate == 0 {
            dest.try_reserve(in_frames * frame_bytes)?;
            for frame in input.chunks_exact(in_channels) {
                map_frame(frame, frame_out);
                push_frame(frame_out, *format, dest);
            }
            return Ok(());
        }

        let step = f64::from(in_rate) / f64::from(*rate);
        let estimate = (in_frames as f64 / step).ceil() as usize + 1;
        dest.try_reserve(estimate * frame_bytes)?;
        let sample = |i: usize, c: usize| {
            if i == 0 {
                prev[c]
            } else {
                input[(i - 1) * in_channels + c]
            }
        };
        let end = in_frames as f64;
        let mut p = *pos;
        while p < end {
            let idx = p as usize;
            let frac = p - idx as f64;
            for (c, s) in frame_in.iter_mut().enumerate() {
                let a = f64::from(sample(idx, c));
                let b = f64::from(sample(idx + 1, c));
                *s = (a + (b - a) * frac).round() as i16;
            }
            map_frame(frame_in, frame_out);
            push_frame(frame_out, *format, dest);
            p += step;
        }
        *pos = p - end;
        if in_frames > 0 {
            prev.copy_from_slice(&input[(in_frames - 1) * in_channels..in_frames * in_channels]);
        }
        Ok(())
    }
}

fn push_frame(frame: &[i16], format: SampleFormat, dest: &mut Vec<u8>) {
    for &s in frame {
        match format {
            SampleFormat::I16 => dest.extend_from_slice(&s.to_le_bytes()),
            SampleFormat::F32 => dest.extend_from_slice(&i16_to_f32(s).to_le_bytes()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_mono16() {
        let data = [0x01, 0x00, 0xFF, 0x7F];
        let out = decode(Format::Mono16, &data).unwrap();
        assert_eq!(out, vec![vec![1, i16::MAX]]);
    }

    #[test]
    fn decode_stereo8_centers_unsigned() {
        let data = [128, 255, 0, 128];
        let out = decode(Format::Stereo8, &data).unwrap();
        assert_eq!(out[0], vec![0, -32768]);
        assert_eq!(out[1], vec![127 << 8, 0]);
    }

    #[test]
    fn decode_float_clamps() {
        let mut data = Vec::new();
        data.extend_from_slice(&2.0f32.to_le_bytes());
        data.extend_from_slice(&(-1.0f32).to_le_bytes());
        let out = decode(Format::MonoFloat32, &data).unwrap();
        assert_eq!(out[0], vec![i16::MAX, -i16::MAX]);
    }

    #[test]
    fn decode_rejects_partial_frames() {
        assert_eq!(
            decode(Format::Stereo16, &[0, 0, 0]),
            Err(Error::InvalidValue("data length is not a whole number of frames"))
        );
    }

    #[test]
    fn resample_identity_and_length() {
        let input: Vec<i16> = (0..100).collect();
        assert_eq!(resample(&input, 44100, 44100), input);
        assert_eq!(resample(&input, 22050, 44100).len(), 200);
        assert_eq!(resample(&input, 48000, 24000).len(), 50);
    }

    #[test]
    fn resample_interpolates_midpoints() {
        let out = resample(&[0, 100], 1, 2);
        assert_eq!(out, vec![0, 50, 100, 100]);
    }

    #[test]
    fn map_frame_layouts() {
        let mut stereo = [0i16; 2];
        map_frame(&[7], &mut stereo);
        assert_eq!(stereo, [7, 7]);

        let mut mono = [0i16; 1];
        map_frame(&[10, 20], &mut mono);
        assert_eq!(mono, [15]);

        let mut quad = [0i16; 4];
        map_frame(&[1, 2], &mut quad);
        assert_eq!(quad, [1, 2, 1, 2]);
    }

    fn to_i16(bytes: &[u8]) -> Vec<i16> {
        bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect()
    }

    #[test]
    fn convert_output_i16_passthrough() {
        let input = [1i16, -1, 300, -300];
        let mut dest = Vec::new();
        OutputConverter::new(2, 44100, SampleFormat::I16)
            .convert_output(&input, 2, 44100, &mut dest)
            .unwrap();
        assert_eq!(to_i16(&dest), input);
    }

    #[test]
    fn convert_output_f32_and_rate() {
        let input = [i16::MAX; 8];
        let mut dest = Vec::new();
        let mut conv = OutputConverter::new(2, 44100, SampleFormat::F32);
        conv.convert_output(&input, 1, 22050, &mut dest).unwrap();
        // Half-frame steps from frame 0 to 6.5; the rest waits for the next block.
        assert_eq!(dest.len(), 14 * 2 * 4);
        let first = f32::from_le_bytes([dest[0], dest[1], dest[2], dest[3]]);
        assert!((first - 1.0).abs() < 1e-6);
    }

    #[test]
    fn rate_conversion_keeps_fractional_frames_across_blocks() {
        let mut conv = OutputConverter::new(1, 48000, SampleFormat::I16);
        let block = vec![0i16; 1024];
        let mut dest = Vec::new();
        let mut total = 0usize;
        for _ in 0..441 {
            conv.convert_output(&block, 1, 44100, &mut dest).unwrap();
            total += dest.len() / 2;
        }
        // 441 blocks of 1024 frames at 44.1 kHz are exactly 491520 frames at 48 kHz.
        assert!(total.abs_diff(491_520) <= 1, "got {total}");
    }

    #[test]
    fn rate_conversion_is_continuous_at_block_edges() {
        let ramp: Vec<i16> = (0..2048).map(|i| (i * 10) as i16).collect();
        let mut whole = Vec::new();
        OutputConverter::new(1, 48000, SampleFormat::I16)
            .convert_output(&ramp, 1, 44100, &mut whole)
            .unwrap();

        let mut conv = OutputConverter::new(1, 48000, SampleFormat::I16);
        let mut split = Vec::new();
        let mut dest = Vec::new();
        for half in ramp.chunks(1024) {
            conv.convert_output(half, 1, 44100, &mut dest).unwrap();
            split.extend_from_slice(&dest);
        }

        let (whole, split) = (to_i16(&whole), to_i16(&split));
        assert!(whole.len().abs_diff(split.len()) <= 1);
        for (a, b) in whole.iter().zip(&split) {
            assert!((a - b).abs() <= 1, "{a} vs {b}");
        }
    }

    #[test]
    fn clamp_saturates() {
        assert_eq!(clamp_i16(40000), i16::MAX);
        assert_eq!(clamp_i16(-40000), i16::MIN);
        assert_eq!(clamp_i16(12), 12);
    }
}
