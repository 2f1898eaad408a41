//! The per-context listener.

use crate::Result;
use crate::error::Error;
use crate::source::{ParamValue, finite_vec3};

/// Listener attribute selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerParam {
    /// `Vec3` position.
    Position,
    /// `Vec3` velocity.
    Velocity,
    /// `Orientation` "at" then "up" vectors.
    Orientation,
    /// `Float` master gain, `>= 0`.
    Gain,
}

/// Where the context hears from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Listener {
    /// Position.
    pub position: [f32; 3],
    /// Velocity.
    pub velocity: [f32; 3],
    /// "At" vector followed by "up" vector.
    pub orientation: [f32; 6],
    /// Master gain applied to every source.
    pub gain: f32,
}

impl Default for Listener {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            velocity: [0.0; 3],
            orientation: [0.0, 0.0, -1.0, 0.0, 1.0, 0.0],
            gain: 1.0,
        }
    }
}

impl Listener {
    /// Creates a listener with the given master gain.
    pub fn with_gain(gain: f32) -> Self {
        Self {
            gain,
            ..Self::default()
        }
    }

    /// Sets one attribute.
    pub fn set(&mut self, param: ListenerParam, value: ParamValue) -> Result<()> {
        match param {
            ListenerParam::Position => self.position = finite_vec3(value.as_vec3()?)?,
            ListenerParam::Velocity => self.velocity = finite_vec3(value.as_vec3()?)?,
            ListenerParam::Orientation => {
                let o = value.as_orientation()?;
                if !o.iter().all(|c| c.is_finite()) {
                    return Err(Error::InvalidValue("orientation component is not finite"));
                }
                self.orientation = o;
            }
            ListenerParam::Gain => {
                let gain = value.as_float()?;
                if !(gain.is_finite() && gain >= 0.0) {
                    return Err(Error::InvalidValue("listener gain"));
                }
                self.gain = gain;
            }
        }
        Ok(())
    }

    /// Reads one attribute.
    pub fn get(&self, param: ListenerParam) -> ParamValue {
        match param {
            ListenerParam::Position => ParamValue::Vec3(self.position),
            ListenerParam::Velocity => ParamValue::Vec3(self.velocity),
            ListenerParam::Orientation => ParamValue::Orientation(self.orientation),
            ListenerParam::Gain => ParamValue::Float(self.gain),
        }
    }
}
