// Joystick pad -> roll heading/speed
//
// The pad is a square of side 2*radius whose top-left corner sits at the pad
// origin; its centre is the neutral point. Heading is measured clockwise from
// the pad's "up" direction, speed scales with distance from the centre.

use std::f64::consts::PI;

use crate::protocol::RollState;

/// Largest speed the roll command accepts
pub const MAX_SPEED: u8 = u8::MAX;

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum MotionError {
    #[error("Pad radius must be positive and finite, got {0}")]
    InvalidRadius(f64),
}

/// Unnormalized result of the pad formula.
/// `degrees` can reach 360 and `speed` exceeds 255 outside the pad.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawMotion {
    pub degrees: f64,
    pub speed: f64,
}

/// Heading in [0, 360) and speed in [0, 255], ready for a roll command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionVector {
    pub heading: u16,
    pub speed: u8,
}

impl MotionVector {
    /// Roll state is always Engage for joystick input
    pub fn roll_state(&self) -> RollState {
        RollState::Engage
    }
}

/// Geometry of the on-screen control pad
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JoystickPad {
    origin_x: f64,
    origin_y: f64,
    radius: f64,
}

impl JoystickPad {
    pub fn new(origin_x: f64, origin_y: f64, radius: f64) -> Result<Self, MotionError> {
        if !radius.is_finite() || radius <= 0.0 {
            return Err(MotionError::InvalidRadius(radius));
        }
        Ok(Self {
            origin_x,
            origin_y,
            radius,
        })
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Pad formula with rounding but no range correction
    pub fn raw(&self, touch_x: f64, touch_y: f64) -> RawMotion {
        let x = touch_x - self.origin_x;
        let y = touch_y - self.origin_y;
        let dx = x - self.radius;
        let dy = y - self.radius;

        // Arguments swapped on purpose: clockwise angle from the vertical axis
        let theta = PI - dx.atan2(dy);
        let degrees = (theta * (180.0 / PI)).round();

        let distance = (dx.abs().powi(2) + dy.abs().powi(2)).sqrt();
        let speed = (distance / self.radius * MAX_SPEED as f64).round();

        RawMotion { degrees, speed }
    }

    /// Map a touch sample. Aiming rotates in place, so speed is forced to 0.
    pub fn map(&self, touch_x: f64, touch_y: f64, aiming: bool) -> MotionVector {
        let raw = self.raw(touch_x, touch_y);
        let heading = raw.degrees.rem_euclid(360.0) as u16;
        let speed = if aiming {
            0
        } else {
            raw.speed.clamp(0.0, MAX_SPEED as f64) as u8
        };
        MotionVector { heading, speed }
    }
}

/// One-shot mapping without keeping a `JoystickPad` around
pub fn map(
    touch_x: f64,
    touch_y: f64,
    pad_origin_x: f64,
    pad_origin_y: f64,
    radius: f64,
    aiming: bool,
) -> Result<MotionVector, MotionError> {
    Ok(JoystickPad::new(pad_origin_x, pad_origin_y, radius)?.map(touch_x, touch_y, aiming))
}
