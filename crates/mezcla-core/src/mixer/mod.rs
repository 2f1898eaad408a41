//! Mixer core: the mix pool, scratch space and summation state.
//!
//! One [`Mixer`] exists per engine runtime, behind the mixer lock. It holds
//! the mix pool (one [`MixSource`] per playing or paused source, across all
//! contexts), the per-channel scratch the split path writes into, and the
//! [`MixManager`] that sums contributions.
//!
//! Lock order for everything the tick touches:
//!
//! ```text
//! mixer → context sources (read) → context filters → source slot → buffer store
//! ```
//!
//! The playback device lock is taken last, and the mixer lock is released
//! before the (possibly blocking) device write.

pub mod manager;
pub mod split;
pub(crate) mod thread;
pub(crate) mod tick;

use std::collections::BTreeMap;

pub use manager::{MixManager, MixShape, mix_generic, mix_specialized};

use crate::Result;
use crate::id::{BufferId, SourceKey};
use crate::pool::SlabPool;

/// A mix-pool entry binding a playing source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MixSource {
    /// The bound source.
    pub key: SourceKey,
    /// Set when the source finished; the slot is freed after the sweep.
    pub destroy_me: bool,
}

/// Mixing state shared by every context of a runtime.
#[derive(Debug, Default)]
pub struct Mixer {
    pub(crate) pool: SlabPool<MixSource>,
    pub(crate) manager: MixManager,
    /// Per-channel split output, grown lazily and never shrunk.
    pub(crate) scratch: Vec<Vec<i16>>,
    /// Interleaved canonical output of the last tick.
    pub(crate) output: Vec<i16>,
    pub(crate) frame: Vec<i16>,
    pub(crate) callback_buf: Vec<i16>,
    /// Stream bytes consumed per buffer during the current sweep.
    pub(crate) stream_advance: BTreeMap<BufferId, usize>,
}

impl Mixer {
    /// Creates an empty mixer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `key` to a new mix slot.
    pub fn add_source(&mut self, key: SourceKey) -> Result<u32> {
        self.pool.alloc(MixSource {
            key,
            destroy_me: false,
        })
    }

    /// Frees a mix slot. Returns false if it was already free.
    pub fn remove_source(&mut self, slot: u32) -> bool {
        self.pool.dealloc(slot, drop)
    }

    /// Mix slots in use and not on their way out.
    pub fn active(&self) -> usize {
        self.pool
            .iter()
            .filter(|(_, entry)| !entry.lock().destroy_me)
            .count()
    }

    /// Entry bound to `slot`.
    pub fn entry(&self, slot: u32) -> Option<MixSource> {
        self.pool.get(slot).map(|e| *e.lock())
    }

    /// Interleaved canonical output of the last tick.
    pub fn output(&self) -> &[i16] {
        &self.output
    }

    /// Scratch channels currently allocated and their length.
    pub fn scratch_shape(&self) -> (usize, usize) {
        (
            self.scratch.len(),
            self.scratch.first().map_or(0, Vec::len),
        )
    }

    /// Grows scratch to at least `channels` × `samples`. Never shrinks.
    pub(crate) fn ensure_scratch(&mut self, channels: usize, samples: usize) -> Result<()> {
        let width = self.scratch.first().map_or(0, Vec::len).max(samples);
        if self.scratch.len() < channels {
            self.scratch.try_reserve(channels - self.scratch.len())?;
            self.scratch.resize_with(channels, Vec::new);
        }
        for channel in &mut self.scratch {
            if channel.len() < width {
                channel.try_reserve(width - channel.len())?;
                channel.resize(width, 0);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{ContextId, SourceId};

    #[test]
    fn scratch_grows_never_shrinks() {
        let mut mixer = Mixer::new();
        mixer.ensure_scratch(1, 64).unwrap();
        assert_eq!(mixer.scratch_shape(), (1, 64));
        mixer.ensure_scratch(2, 16).unwrap();
        assert_eq!(mixer.scratch_shape(), (2, 64));
        mixer.ensure_scratch(1, 128).unwrap();
        assert_eq!(mixer.scratch_shape(), (2, 128));
    }

    #[test]
    fn mix_slots() {
        let mut mixer = Mixer::new();
        let key = SourceKey::new(ContextId(1), SourceId(0x4000));
        let slot = mixer.add_source(key).unwrap();
        assert_eq!(mixer.active(), 1);
        assert_eq!(mixer.entry(slot).unwrap().key, key);
        assert!(mixer.remove_source(slot));
        assert!(!mixer.remove_source(slot));
        assert_eq!(mixer.active(), 0);
    }
}
