//! Typed source attributes.

use crate::Result;
use crate::error::Error;
use crate::id::BufferId;

use super::{Source, SourceState};

/// Source attribute selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceParam {
    /// `Vec3` position.
    Position,
    /// `Vec3` velocity.
    Velocity,
    /// `Vec3` direction.
    Direction,
    /// `Float` gain, `>= 0`.
    Gain,
    /// `Float` lower gain clamp in `[0, 1]`.
    MinGain,
    /// `Float` upper gain clamp in `[0, 1]`.
    MaxGain,
    /// `Float` inner cone angle in degrees, `[0, 360]`.
    ConeInnerAngle,
    /// `Float` outer cone angle in degrees, `[0, 360]`.
    ConeOuterAngle,
    /// `Float` gain outside the outer cone, `[0, 1]`.
    ConeOuterGain,
    /// `Float` pitch multiplier, `> 0`.
    Pitch,
    /// `Float` reference distance, `>= 0`.
    ReferenceDistance,
    /// `Float` max distance, `>= 0`.
    MaxDistance,
    /// `Float` rolloff factor, `>= 0`.
    RolloffFactor,
    /// `Bool` position is listener-relative.
    Relative,
    /// `Bool` loop the current buffer.
    Looping,
    /// `Bool` source is fed by streaming buffers.
    Streaming,
    /// `Buffer` single attached buffer. Only settable while not playing.
    Buffer,
    /// `State` play state. Read-only.
    SourceState,
    /// `Int` real queue entries. Read-only.
    BuffersQueued,
    /// `Int` consumed queue entries. Read-only.
    BuffersProcessed,
    /// `Int` cursor in bytes per channel into the current buffer.
    ByteOffset,
}

impl SourceParam {
    /// Every selector, in declaration order.
    pub const ALL: [SourceParam; 21] = [
        SourceParam::Position,
        SourceParam::Velocity,
        SourceParam::Direction,
        SourceParam::Gain,
        SourceParam::MinGain,
        SourceParam::MaxGain,
        SourceParam::ConeInnerAngle,
        SourceParam::ConeOuterAngle,
        SourceParam::ConeOuterGain,
        SourceParam::Pitch,
        SourceParam::ReferenceDistance,
        SourceParam::MaxDistance,
        SourceParam::RolloffFactor,
        SourceParam::Relative,
        SourceParam::Looping,
        SourceParam::Streaming,
        SourceParam::Buffer,
        SourceParam::SourceState,
        SourceParam::BuffersQueued,
        SourceParam::BuffersProcessed,
        SourceParam::ByteOffset,
    ];

    /// Returns true for selectors that can only be queried.
    pub const fn is_read_only(self) -> bool {
        matches!(
            self,
            SourceParam::SourceState | SourceParam::BuffersQueued | SourceParam::BuffersProcessed
        )
    }
}

/// A typed attribute value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    /// Scalar.
    Float(f32),
    /// Three-component vector.
    Vec3([f32; 3]),
    /// "At" vector followed by "up" vector.
    Orientation([f32; 6]),
    /// Flag.
    Bool(bool),
    /// Count or offset.
    Int(i64),
    /// Buffer id.
    Buffer(BufferId),
    /// Play state.
    State(SourceState),
}

impl ParamValue {
    /// Returns the scalar or `IllegalEnum`.
    pub fn as_float(self) -> Result<f32> {
        match self {
            ParamValue::Float(v) => Ok(v),
            _ => Err(Error::IllegalEnum("expected a float value")),
        }
    }

    /// Returns the vector or `IllegalEnum`.
    pub fn as_vec3(self) -> Result<[f32; 3]> {
        match self {
            ParamValue::Vec3(v) => Ok(v),
            _ => Err(Error::IllegalEnum("expected a vector value")),
        }
    }

    /// Returns the orientation or `IllegalEnum`.
    pub fn as_orientation(self) -> Result<[f32; 6]> {
        match self {
            ParamValue::Orientation(v) => Ok(v),
            _ => Err(Error::IllegalEnum("expected an orientation value")),
        }
    }

    /// Returns the flag or `IllegalEnum`.
    pub fn as_bool(self) -> Result<bool> {
        match self {
            ParamValue::Bool(v) => Ok(v),
            _ => Err(Error::IllegalEnum("expected a bool value")),
        }
    }

    /// Returns the integer or `IllegalEnum`.
    pub fn as_int(self) -> Result<i64> {
        match self {
            ParamValue::Int(v) => Ok(v),
            _ => Err(Error::IllegalEnum("expected an integer value")),
        }
    }

    /// Returns the buffer id or `IllegalEnum`.
    pub fn as_buffer(self) -> Result<BufferId> {
        match self {
            ParamValue::Buffer(v) => Ok(v),
            _ => Err(Error::IllegalEnum("expected a buffer value")),
        }
    }
}

pub(crate) fn finite_vec3(v: [f32; 3]) -> Result<[f32; 3]> {
    if v.iter().all(|c| c.is_finite()) {
        Ok(v)
    } else {
        Err(Error::InvalidValue("vector component is not finite"))
    }
}

pub(crate) fn in_range(v: f32, min: f32, max: f32, what: &'static str) -> Result<f32> {
    if v.is_finite() && v >= min && v <= max {
        Ok(v)
    } else {
        Err(Error::InvalidValue(what))
    }
}

fn non_negative(v: f32, what: &'static str) -> Result<f32> {
    in_range(v, 0.0, f32::MAX, what)
}

impl Source {
    /// Sets a plain attribute.
    ///
    /// `Buffer` and `ByteOffset` touch buffer state and are set through the
    /// engine; passing them here, or a read-only selector, is `IllegalEnum`.
    pub fn set(&mut self, param: SourceParam, value: ParamValue) -> Result<()> {
        let attrs = &mut self.attrs;
        match param {
            SourceParam::Position => attrs.position = Some(finite_vec3(value.as_vec3()?)?),
            SourceParam::Velocity => attrs.velocity = Some(finite_vec3(value.as_vec3()?)?),
            SourceParam::Direction => attrs.direction = Some(finite_vec3(value.as_vec3()?)?),
            SourceParam::Gain => attrs.gain = Some(non_negative(value.as_float()?, "gain")?),
            SourceParam::MinGain => {
                attrs.min_gain = Some(in_range(value.as_float()?, 0.0, 1.0, "min gain")?);
            }
            SourceParam::MaxGain => {
                attrs.max_gain = Some(in_range(value.as_float()?, 0.0, 1.0, "max gain")?);
            }
            SourceParam::ConeInnerAngle => {
                attrs.cone_inner_angle =
                    Some(in_range(value.as_float()?, 0.0, 360.0, "cone inner angle")?);
            }
            SourceParam::ConeOuterAngle => {
                attrs.cone_outer_angle =
                    Some(in_range(value.as_float()?, 0.0, 360.0, "cone outer angle")?);
            }
            SourceParam::ConeOuterGain => {
                attrs.cone_outer_gain =
                    Some(in_range(value.as_float()?, 0.0, 1.0, "cone outer gain")?);
            }
            SourceParam::Pitch => {
                let pitch = value.as_float()?;
                if !(pitch.is_finite() && pitch > 0.0) {
                    return Err(Error::InvalidValue("pitch"));
                }
                attrs.pitch = Some(pitch);
            }
            SourceParam::ReferenceDistance => {
                attrs.reference_distance =
                    Some(non_negative(value.as_float()?, "reference distance")?);
            }
            SourceParam::MaxDistance => {
                attrs.max_distance = Some(non_negative(value.as_float()?, "max distance")?);
            }
            SourceParam::RolloffFactor => {
                attrs.rolloff_factor = Some(non_negative(value.as_float()?, "rolloff factor")?);
            }
            SourceParam::Relative => attrs.relative = Some(value.as_bool()?),
            SourceParam::Looping => attrs.looping = Some(value.as_bool()?),
            SourceParam::Streaming => attrs.streaming = Some(value.as_bool()?),
            SourceParam::Buffer
            | SourceParam::ByteOffset
            | SourceParam::SourceState
            | SourceParam::BuffersQueued
            | SourceParam::BuffersProcessed => {
                return Err(Error::IllegalEnum("attribute cannot be set directly"));
            }
        }
        Ok(())
    }

    /// Reads an attribute, falling back to defaults for unset ones.
    pub fn get(&self, param: SourceParam) -> ParamValue {
        match param {
            SourceParam::Position => ParamValue::Vec3(self.position()),
            SourceParam::Velocity => ParamValue::Vec3(self.velocity()),
            SourceParam::Direction => ParamValue::Vec3(self.direction()),
            SourceParam::Gain => ParamValue::Float(self.gain()),
            SourceParam::MinGain => ParamValue::Float(self.min_gain()),
            SourceParam::MaxGain => ParamValue::Float(self.max_gain()),
            SourceParam::ConeInnerAngle => ParamValue::Float(self.cone_inner_angle()),
            SourceParam::ConeOuterAngle => ParamValue::Float(self.cone_outer_angle()),
            SourceParam::ConeOuterGain => ParamValue::Float(self.cone_outer_gain()),
            SourceParam::Pitch => ParamValue::Float(self.pitch()),
            SourceParam::ReferenceDistance => ParamValue::Float(self.reference_distance()),
            SourceParam::MaxDistance => ParamValue::Float(self.max_distance()),
            SourceParam::RolloffFactor => ParamValue::Float(self.rolloff_factor()),
            SourceParam::Relative => ParamValue::Bool(self.is_relative()),
            SourceParam::Looping => ParamValue::Bool(self.is_looping()),
            SourceParam::Streaming => ParamValue::Bool(self.is_streaming()),
            SourceParam::Buffer => ParamValue::Buffer(self.queue.current()),
            SourceParam::SourceState => ParamValue::State(self.state),
            SourceParam::BuffersQueued => ParamValue::Int(self.queue.queued() as i64),
            SourceParam::BuffersProcessed => ParamValue::Int(self.queue.processed() as i64),
            SourceParam::ByteOffset => ParamValue::Int(self.soundpos as i64),
        }
    }

    /// Returns true if the attribute was explicitly set.
    ///
    /// Derived selectors (state, counts, offset) and the buffer always
    /// report true.
    pub fn is_set(&self, param: SourceParam) -> bool {
        let a = &self.attrs;
        match param {
            SourceParam::Position => a.position.is_some(),
            SourceParam::Velocity => a.velocity.is_some(),
            SourceParam::Direction => a.direction.is_some(),
            SourceParam::Gain => a.gain.is_some(),
            SourceParam::MinGain => a.min_gain.is_some(),
            SourceParam::MaxGain => a.max_gain.is_some(),
            SourceParam::ConeInnerAngle => a.cone_inner_angle.is_some(),
            SourceParam::ConeOuterAngle => a.cone_outer_angle.is_some(),
            SourceParam::ConeOuterGain => a.cone_outer_gain.is_some(),
            SourceParam::Pitch => a.pitch.is_some(),
            SourceParam::ReferenceDistance => a.reference_distance.is_some(),
            SourceParam::MaxDistance => a.max_distance.is_some(),
            SourceParam::RolloffFactor => a.rolloff_factor.is_some(),
            SourceParam::Relative => a.relative.is_some(),
            SourceParam::Looping => a.looping.is_some(),
            SourceParam::Streaming => a.streaming.is_some(),
            SourceParam::Buffer
            | SourceParam::SourceState
            | SourceParam::BuffersQueued
            | SourceParam::BuffersProcessed
            | SourceParam::ByteOffset => true,
        }
    }
}
