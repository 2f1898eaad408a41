//! Bounded sample queue between the mixer and a real-time audio callback.
//!
//! Playback pushes with [`SampleQueue::push_blocking`], which waits for the
//! callback to drain space and therefore paces the mixer at the device's
//! rate. Capture pushes from the callback with [`SampleQueue::push_lossy`],
//! which never blocks and drops the oldest samples instead.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

#[derive(Debug)]
struct State {
    samples: VecDeque<f32>,
    closed: bool,
    underruns: u64,
}

/// Fixed-capacity FIFO of interleaved `f32` samples.
#[derive(Debug)]
pub struct SampleQueue {
    state: Mutex<State>,
    space: Condvar,
    capacity: usize,
}

impl SampleQueue {
    /// Creates a queue holding at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(State {
                samples: VecDeque::with_capacity(capacity),
                closed: false,
                underruns: 0,
            }),
            space: Condvar::new(),
            capacity,
        }
    }

    /// Maximum number of queued samples.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples currently queued.
    pub fn len(&self) -> usize {
        self.state.lock().samples.len()
    }

    /// Returns true when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Times [`pop_into`](Self::pop_into) had to pad with silence.
    pub fn underruns(&self) -> u64 {
        self.state.lock().underruns
    }

    /// Appends every sample, waiting for space as needed.
    ///
    /// Returns false if no space appeared within `timeout` or the queue was
    /// closed; samples not yet queued at that point are dropped.
    pub fn push_blocking(&self, samples: &[f32], timeout: Duration) -> bool {
        let mut rest = samples;
        let mut state = self.state.lock();
        while !rest.is_empty() {
            if state.closed {
                return false;
            }
            let free = self.capacity - state.samples.len();
            if free == 0 {
                if self.space.wait_for(&mut state, timeout).timed_out()
                    && state.samples.len() == self.capacity
                {
                    return false;
                }
                continue;
            }
            let n = free.min(rest.len());
            state.samples.extend(&rest[..n]);
            rest = &rest[n..];
        }
        true
    }

    /// Appends samples without waiting, discarding the oldest ones on overflow.
    pub fn push_lossy(&self, samples: &[f32]) {
        let mut state = self.state.lock();
        let keep = samples.len().min(self.capacity);
        let overflow = (state.samples.len() + keep).saturating_sub(self.capacity);
        state.samples.drain(..overflow);
        state.samples.extend(&samples[samples.len() - keep..]);
    }

    /// Fills `out` from the front of the queue, padding with silence.
    /// Returns how many real samples were copied.
    pub fn pop_into(&self, out: &mut [f32]) -> usize {
        let mut state = self.state.lock();
        let n = out.len().min(state.samples.len());
        for (dst, src) in out.iter_mut().zip(state.samples.drain(..n)) {
            *dst = src;
        }
        out[n..].fill(0.0);
        if n < out.len() {
            state.underruns += 1;
        }
        drop(state);
        if n > 0 {
            self.space.notify_all();
        }
        n
    }

    /// Copies up to `out.len()` samples without padding; returns the count.
    pub fn pop_available(&self, out: &mut [f32]) -> usize {
        let mut state = self.state.lock();
        let n = out.len().min(state.samples.len());
        for (dst, src) in out.iter_mut().zip(state.samples.drain(..n)) {
            *dst = src;
        }
        drop(state);
        if n > 0 {
            self.space.notify_all();
        }
        n
    }

    /// Drops every queued sample.
    pub fn clear(&self) {
        self.state.lock().samples.clear();
        self.space.notify_all();
    }

    /// Wakes and fails every pending and future blocking push.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.space.notify_all();
    }
}
