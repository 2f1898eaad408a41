//! Sources: playable entities with attributes, a buffer queue and a cursor.
//!
//! Attributes are stored as `Option<T>`: `None` means "never set", in which
//! case reads fall back to the [`SourceDefaults`] the source was created
//! with. The play state machine is:
//!
//! | from \ op | play     | pause  | stop    | rewind  |
//! |-----------|----------|--------|---------|---------|
//! | Initial   | Playing  | -      | -       | -       |
//! | Playing   | -        | Paused | Stopped | Initial |
//! | Paused    | Playing  | -      | Stopped | Initial |
//! | Stopped   | Playing  | -      | -       | -       |
//!
//! (`-` is a no-op.) The engine owns the side effects of each transition
//! (mix-slot allocation, buffer reference moves); [`SourceState::after`]
//! is the pure table.

mod params;
mod queue;

pub use params::{ParamValue, SourceParam};
pub use queue::{BufferQueue, QueueEntry, QueueState};

pub(crate) use params::{finite_vec3, in_range};

use crate::id::SourceId;

/// Play state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SourceState {
    /// Never played, or rewound.
    #[default]
    Initial,
    /// Being mixed.
    Playing,
    /// Holding its cursor; skipped by the mixer.
    Paused,
    /// Finished or stopped.
    Stopped,
}

/// A state transition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    /// Start or resume.
    Play,
    /// Pause a playing source.
    Pause,
    /// Stop a playing or paused source.
    Stop,
    /// Stop then return to `Initial`.
    Rewind,
}

impl SourceState {
    /// State reached by applying `op`, assuming the play preconditions hold.
    pub const fn after(self, op: Transition) -> SourceState {
        use SourceState::{Initial, Paused, Playing, Stopped};
        match (self, op) {
            (Initial | Stopped | Paused, Transition::Play) => Playing,
            (Playing, Transition::Pause) => Paused,
            (Playing | Paused, Transition::Stop) => Stopped,
            (Playing | Paused, Transition::Rewind) => Initial,
            (state, _) => state,
        }
    }

    /// Returns true while the source holds a mix slot.
    pub const fn is_active(self) -> bool {
        matches!(self, SourceState::Playing | SourceState::Paused)
    }
}

/// Values used for attributes a source never set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceDefaults {
    /// Position.
    pub position: [f32; 3],
    /// Velocity.
    pub velocity: [f32; 3],
    /// Direction.
    pub direction: [f32; 3],
    /// Gain.
    pub gain: f32,
    /// Lower gain clamp.
    pub min_gain: f32,
    /// Upper gain clamp.
    pub max_gain: f32,
    /// Inner cone angle.
    pub cone_inner_angle: f32,
    /// Outer cone angle.
    pub cone_outer_angle: f32,
    /// Gain outside the outer cone.
    pub cone_outer_gain: f32,
    /// Pitch.
    pub pitch: f32,
    /// Reference distance.
    pub reference_distance: f32,
    /// Max distance.
    pub max_distance: f32,
    /// Rolloff factor.
    pub rolloff_factor: f32,
    /// Listener-relative positioning.
    pub relative: bool,
    /// Looping.
    pub looping: bool,
}

impl Default for SourceDefaults {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            velocity: [0.0; 3],
            direction: [0.0; 3],
            gain: 1.0,
            min_gain: 0.0,
            max_gain: 1.0,
            cone_inner_angle: 360.0,
            cone_outer_angle: 360.0,
            cone_outer_gain: 0.0,
            pitch: 1.0,
            reference_distance: 1.0,
            max_distance: f32::MAX,
            rolloff_factor: 1.0,
            relative: false,
            looping: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct Attributes {
    pub position: Option<[f32; 3]>,
    pub velocity: Option<[f32; 3]>,
    pub direction: Option<[f32; 3]>,
    pub gain: Option<f32>,
    pub min_gain: Option<f32>,
    pub max_gain: Option<f32>,
    pub cone_inner_angle: Option<f32>,
    pub cone_outer_angle: Option<f32>,
    pub cone_outer_gain: Option<f32>,
    pub pitch: Option<f32>,
    pub reference_distance: Option<f32>,
    pub max_distance: Option<f32>,
    pub rolloff_factor: Option<f32>,
    pub relative: Option<bool>,
    pub looping: Option<bool>,
    pub streaming: Option<bool>,
}

/// A playable entity.
#[derive(Debug, Clone)]
pub struct Source {
    id: SourceId,
    defaults: SourceDefaults,
    pub(crate) attrs: Attributes,
    pub(crate) state: SourceState,
    pub(crate) queue: BufferQueue,
    /// Bytes per channel into the current buffer.
    pub(crate) soundpos: usize,
    /// Sub-sample remainder kept by the pitch filter.
    pub(crate) pitch_frac: f64,
    /// Set by a filter that advanced the cursor itself this tick.
    pub(crate) filter_advanced: bool,
    /// Mix-pool slot while playing or paused.
    pub(crate) mix_slot: Option<u32>,
}

impl Source {
    /// Creates a source in `Initial` with a fresh queue.
    pub fn new(id: SourceId, defaults: SourceDefaults) -> Self {
        Self {
            id,
            defaults,
            attrs: Attributes::default(),
            state: SourceState::Initial,
            queue: BufferQueue::new(),
            soundpos: 0,
            pitch_frac: 0.0,
            filter_advanced: false,
            mix_slot: None,
        }
    }

    /// Source id.
    pub fn id(&self) -> SourceId {
        self.id
    }

    /// Play state.
    pub fn state(&self) -> SourceState {
        self.state
    }

    /// Buffer queue.
    pub fn queue(&self) -> &BufferQueue {
        &self.queue
    }

    /// Cursor in bytes per channel into the current buffer.
    pub fn cursor(&self) -> usize {
        self.soundpos
    }

    /// Marks the cursor as already advanced for this tick.
    pub fn claim_cursor(&mut self) {
        self.filter_advanced = true;
    }

    /// Moves the cursor to `bytes`.
    pub fn set_cursor(&mut self, bytes: usize) {
        self.soundpos = bytes;
    }

    /// Sub-sample remainder for resampling filters.
    pub fn resample_remainder(&self) -> f64 {
        self.pitch_frac
    }

    /// Stores the sub-sample remainder for resampling filters.
    pub fn set_resample_remainder(&mut self, frac: f64) {
        self.pitch_frac = frac;
    }

    /// Position.
    pub fn position(&self) -> [f32; 3] {
        self.attrs.position.unwrap_or(self.defaults.position)
    }

    /// Velocity.
    pub fn velocity(&self) -> [f32; 3] {
        self.attrs.velocity.unwrap_or(self.defaults.velocity)
    }

    /// Direction.
    pub fn direction(&self) -> [f32; 3] {
        self.attrs.direction.unwrap_or(self.defaults.direction)
    }

    /// Gain.
    pub fn gain(&self) -> f32 {
        self.attrs.gain.unwrap_or(self.defaults.gain)
    }

    /// Lower gain clamp.
    pub fn min_gain(&self) -> f32 {
        self.attrs.min_gain.unwrap_or(self.defaults.min_gain)
    }

    /// Upper gain clamp.
    pub fn max_gain(&self) -> f32 {
        self.attrs.max_gain.unwrap_or(self.defaults.max_gain)
    }

    /// Inner cone angle.
    pub fn cone_inner_angle(&self) -> f32 {
        self.attrs
            .cone_inner_angle
            .unwrap_or(self.defaults.cone_inner_angle)
    }

    /// Outer cone angle.
    pub fn cone_outer_angle(&self) -> f32 {
        self.attrs
            .cone_outer_angle
            .unwrap_or(self.defaults.cone_outer_angle)
    }

    /// Gain outside the outer cone.
    pub fn cone_outer_gain(&self) -> f32 {
        self.attrs
            .cone_outer_gain
            .unwrap_or(self.defaults.cone_outer_gain)
    }

    /// Pitch multiplier.
    pub fn pitch(&self) -> f32 {
        self.attrs.pitch.unwrap_or(self.defaults.pitch)
    }

    /// Reference distance.
    pub fn reference_distance(&self) -> f32 {
        self.attrs
            .reference_distance
            .unwrap_or(self.defaults.reference_distance)
    }

    /// Max distance.
    pub fn max_distance(&self) -> f32 {
        self.attrs.max_distance.unwrap_or(self.defaults.max_distance)
    }

    /// Rolloff factor.
    pub fn rolloff_factor(&self) -> f32 {
        self.attrs
            .rolloff_factor
            .unwrap_or(self.defaults.rolloff_factor)
    }

    /// Listener-relative positioning.
    pub fn is_relative(&self) -> bool {
        self.attrs.relative.unwrap_or(self.defaults.relative)
    }

    /// Looping.
    pub fn is_looping(&self) -> bool {
        self.attrs.looping.unwrap_or(self.defaults.looping)
    }

    /// Streaming flag.
    pub fn is_streaming(&self) -> bool {
        self.attrs.streaming.unwrap_or(false)
    }

    /// Resets cursor and read index for a fresh start.
    pub(crate) fn reset_playback(&mut self) {
        self.soundpos = 0;
        self.pitch_frac = 0.0;
        self.queue.rewind();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table() {
        use SourceState::{Initial, Paused, Playing, Stopped};
        use Transition::{Pause, Play, Rewind, Stop};
        let table = [
            (Initial, Play, Playing),
            (Initial, Pause, Initial),
            (Initial, Stop, Initial),
            (Initial, Rewind, Initial),
            (Playing, Play, Playing),
            (Playing, Pause, Paused),
            (Playing, Stop, Stopped),
            (Playing, Rewind, Initial),
            (Paused, Play, Playing),
            (Paused, Pause, Paused),
            (Paused, Stop, Stopped),
            (Paused, Rewind, Initial),
            (Stopped, Play, Playing),
            (Stopped, Pause, Stopped),
            (Stopped, Stop, Stopped),
            (Stopped, Rewind, Stopped),
        ];
        for (from, op, to) in table {
            assert_eq!(from.after(op), to, "{from:?} + {op:?}");
        }
    }

    #[test]
    fn new_source_is_initial_with_placeholder() {
        let src = Source::new(SourceId(3), SourceDefaults::default());
        assert_eq!(src.state(), SourceState::Initial);
        assert_eq!(src.queue().len(), 1);
        assert_eq!(src.cursor(), 0);
        assert!(!src.is_looping());
    }
}
