//! The Mix Manager: per-tick contributions and their summation.
//!
//! During a tick each contributing source writes one interleaved entry into
//! the manager's arena. At flush time the entries are summed sample by
//! sample in `i32` and clamped once to the `i16` range. The routine is
//! picked by [`MixShape`]: dedicated loops for zero to four entries, and a
//! generic loop for anything larger. Every shape produces output identical
//! to [`mix_generic`].

use crate::Result;
use crate::format::clamp_i16;

/// Summation routine chosen for an entry count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MixShape {
    /// No entries: silence.
    Silent,
    /// One entry: copy.
    One,
    /// Two entries.
    Two,
    /// Three entries.
    Three,
    /// Four entries.
    Four,
    /// Five or more: generic loop.
    Many,
}

impl MixShape {
    /// Shape for `count` entries.
    pub const fn for_count(count: usize) -> MixShape {
        match count {
            0 => MixShape::Silent,
            1 => MixShape::One,
            2 => MixShape::Two,
            3 => MixShape::Three,
            4 => MixShape::Four,
            _ => MixShape::Many,
        }
    }
}

/// Reference summation: for every output index, the clamped sum of every
/// entry long enough to reach it.
pub fn mix_generic<S: AsRef<[i16]>>(entries: &[S], out: &mut [i16]) {
    mix_tail(entries, out, 0);
}

fn mix_tail<S: AsRef<[i16]>>(entries: &[S], out: &mut [i16], from: usize) {
    for (i, o) in out.iter_mut().enumerate().skip(from) {
        let sum: i32 = entries
            .iter()
            .filter_map(|e| e.as_ref().get(i))
            .map(|&s| i32::from(s))
            .sum();
        *o = clamp_i16(sum);
    }
}

/// Shape-dispatched summation.
pub fn mix_specialized<S: AsRef<[i16]>>(entries: &[S], out: &mut [i16]) {
    let done = match (MixShape::for_count(entries.len()), entries) {
        (MixShape::Silent, _) => {
            out.fill(0);
            return;
        }
        (MixShape::One, [a]) => {
            let a = a.as_ref();
            let n = a.len().min(out.len());
            out[..n].copy_from_slice(&a[..n]);
            n
        }
        (MixShape::Two, [a, b]) => {
            let mut n = 0;
            for ((o, &x), &y) in out.iter_mut().zip(a.as_ref()).zip(b.as_ref()) {
                *o = clamp_i16(i32::from(x) + i32::from(y));
                n += 1;
            }
            n
        }
        (MixShape::Three, [a, b, c]) => {
            let mut n = 0;
            for (((o, &x), &y), &z) in out
                .iter_mut()
                .zip(a.as_ref())
                .zip(b.as_ref())
                .zip(c.as_ref())
            {
                *o = clamp_i16(i32::from(x) + i32::from(y) + i32::from(z));
                n += 1;
            }
            n
        }
        (MixShape::Four, [a, b, c, d]) => {
            let mut n = 0;
            for ((((o, &w), &x), &y), &z) in out
                .iter_mut()
                .zip(a.as_ref())
                .zip(b.as_ref())
                .zip(c.as_ref())
                .zip(d.as_ref())
            {
                *o = clamp_i16(i32::from(w) + i32::from(x) + i32::from(y) + i32::from(z));
                n += 1;
            }
            n
        }
        _ => 0,
    };
    mix_tail(entries, out, done);
}

/// Arena of per-tick contributions.
#[derive(Debug, Default)]
pub struct MixManager {
    arena: Vec<Vec<i16>>,
    count: usize,
}

impl MixManager {
    /// Creates an empty manager.
    pub const fn new() -> Self {
        Self {
            arena: Vec::new(),
            count: 0,
        }
    }

    /// Entries added since the last flush.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns true if no entries are pending.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Arena slots allocated.
    pub fn capacity(&self) -> usize {
        self.arena.len()
    }

    /// Reserves a zeroed entry of `samples` samples and returns it for filling.
    ///
    /// The arena doubles when full.
    pub fn next_entry(&mut self, samples: usize) -> Result<&mut [i16]> {
        if self.count == self.arena.len() {
            let grown = (self.arena.len() * 2).max(4);
            self.arena.try_reserve_exact(grown - self.arena.len())?;
            self.arena.resize_with(grown, Vec::new);
        }
        let entry = &mut self.arena[self.count];
        entry.clear();
        entry.try_reserve(samples)?;
        entry.resize(samples, 0);
        self.count += 1;
        Ok(entry.as_mut_slice())
    }

    /// Adds a copy of `samples` as a new entry.
    pub fn add(&mut self, samples: &[i16]) -> Result<()> {
        self.next_entry(samples.len())?.copy_from_slice(samples);
        Ok(())
    }

    /// Sums pending entries into `out` and resets the entry count.
    pub fn mix_into(&mut self, out: &mut [i16]) {
        mix_specialized(&self.arena[..self.count], out);
        self.count = 0;
    }

    /// Drops pending entries without summing.
    pub fn clear(&mut self) {
        self.count = 0;
    }
}
