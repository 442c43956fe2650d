//! # Joystick mixer
//!
//! Converts a two axis joystick position into a wheel command for manual driving. The throttle
//! axis sets the speed of both wheels, the steering axis slows down the wheel on the inside of
//! the turn.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use comms_if::eqpt::drive::{DirectionSign, WheelCommand};
use util::maths::{clamp, round_dp};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JoystickParams {
    /// Wheel speed at full throttle.
    pub max_speed: f64,

    /// Fraction of the inside wheel's speed removed at full steering, in `[0, 1]`.
    pub drift_factor: f64,
}

#[derive(Debug, Clone)]
pub struct JoystickMixer {
    params: JoystickParams,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl JoystickMixer {
    pub fn new(params: JoystickParams) -> Self {
        Self { params }
    }

    /// Clamp an axis into `[-1, 1]` with two decimal places, as reported by the stick widget.
    pub fn quantise(axis: f64) -> f64 {
        if !axis.is_finite() {
            return 0.0;
        }
        round_dp(clamp(&axis, &-1.0, &1.0), 2)
    }

    /// Mix a stick position into a wheel command.
    ///
    /// The wheel velocities are magnitudes, the direction field carries the sign of the throttle.
    pub fn mix(&self, x: f64, y: f64) -> WheelCommand {
        let x = Self::quantise(x);
        let y = Self::quantise(y);

        let speed = y * self.params.max_speed;
        let drift = self.params.drift_factor * x;

        let mut left = speed.abs();
        let mut right = speed.abs();

        if drift >= 0.0 {
            right *= 1.0 - drift;
        } else {
            left *= 1.0 - drift.abs();
        }

        WheelCommand {
            left,
            right,
            signal: 0,
            direction: DirectionSign::of(y),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn mixer() -> JoystickMixer {
        JoystickMixer::new(JoystickParams {
            max_speed: 200.0,
            drift_factor: 0.5,
        })
    }

    #[test]
    fn test_straight() {
        let cmd = mixer().mix(0.0, 1.0);
        assert_eq!((cmd.left, cmd.right), (200.0, 200.0));
        assert_eq!(cmd.direction, DirectionSign::Forward);

        let cmd = mixer().mix(0.0, -0.5);
        assert_eq!((cmd.left, cmd.right), (100.0, 100.0));
        assert_eq!(cmd.direction, DirectionSign::Reverse);
        assert_eq!(cmd.to_payload(), "100.000,100.000,-1,0");
    }

    #[test]
    fn test_steering_slows_inside_wheel() {
        let cmd = mixer().mix(1.0, 1.0);
        assert_eq!((cmd.left, cmd.right), (200.0, 100.0));

        let cmd = mixer().mix(-1.0, 1.0);
        assert_eq!((cmd.left, cmd.right), (100.0, 200.0));
    }

    #[test]
    fn test_neutral_and_clamping() {
        let cmd = mixer().mix(0.7, 0.0);
        assert!(cmd.is_stationary());
        assert_eq!(cmd.direction, DirectionSign::Signed);

        let cmd = mixer().mix(0.0, 3.0);
        assert_eq!(cmd.left, 200.0);

        assert_eq!(JoystickMixer::quantise(0.123), 0.12);
        assert_eq!(JoystickMixer::quantise(f64::NAN), 0.0);
    }
}
