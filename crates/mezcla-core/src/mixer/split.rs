//! Copy routines for the split read path.
//!
//! All positions and lengths here are in samples of one channel; callers
//! convert from the byte cursors kept by sources. Each routine fills the
//! whole of `out`, zero-padding whatever it cannot source.

/// Fills `out` from `data` starting at `pos`, wrapping to the start as
/// often as needed. An empty `data` yields silence.
pub fn copy_looping(data: &[i16], pos: usize, out: &mut [i16]) {
    if data.is_empty() {
        out.fill(0);
        return;
    }
    let mut read = pos % data.len();
    let mut written = 0;
    while written < out.len() {
        let n = (data.len() - read).min(out.len() - written);
        out[written..written + n].copy_from_slice(&data[read..read + n]);
        written += n;
        read = 0;
    }
}

/// Copies the tail of `current` from `pos`, then the head of `next`.
///
/// Returns the samples of real data written.
pub fn copy_with_next(current: &[i16], pos: usize, next: &[i16], out: &mut [i16]) -> usize {
    let tail = copy_clamped(current, pos, out);
    let rest = &mut out[tail..];
    let head = rest.len().min(next.len());
    rest[..head].copy_from_slice(&next[..head]);
    tail + head
}

/// Copies as much of `data[pos..]` as fits; returns the samples written.
pub fn copy_clamped(data: &[i16], pos: usize, out: &mut [i16]) -> usize {
    let available = data.get(pos..).unwrap_or(&[]);
    let n = available.len().min(out.len());
    out[..n].copy_from_slice(&available[..n]);
    out[n..].fill(0);
    n
}

/// Splits interleaved frames into per-channel vectors.
///
/// `frames` frames are read from `interleaved`; each `out[c]` receives at
/// least that many samples (the rest is left as-is).
pub fn deinterleave(interleaved: &[i16], channels: usize, frames: usize, out: &mut [Vec<i16>]) {
    if channels == 0 {
        return;
    }
    for (f, frame) in interleaved.chunks_exact(channels).take(frames).enumerate() {
        for (c, &s) in frame.iter().enumerate() {
            if let Some(ch) = out.get_mut(c)
                && let Some(dst) = ch.get_mut(f)
            {
                *dst = s;
            }
        }
    }
}
