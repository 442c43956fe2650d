//! # Drive Equipment Commands
//!
//! Wheel velocity commands sent to the rover's drive peer, and the ASCII wire payload they are
//! encoded into.
//!
//! The canonical payload has four comma separated fields:
//!
//! ```text
//! <left:.3>,<right:.3>,<direction>,<signal>
//! ```
//!
//! The peer also accepts the legacy three field form `<left>,<right>,<signal>`, in which the wheel
//! velocities are always signed.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A pair of wheel velocity demands plus the auxiliary signal (horn) channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WheelCommand {
    /// Left wheel velocity demand.
    pub left: f64,

    /// Right wheel velocity demand.
    pub right: f64,

    /// Auxiliary signal, `1` sounds the horn once, `0` does nothing.
    pub signal: u8,

    /// How the peer shall interpret the sign of `left` and `right`.
    pub direction: DirectionSign,
}

/// Wheel demands decoded from a payload by the drive peer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveDems {
    /// Signed left wheel velocity.
    pub left: f64,

    /// Signed right wheel velocity.
    pub right: f64,

    /// Auxiliary signal.
    pub signal: u8,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Direction field of the wire payload.
///
/// `Signed` means the wheel velocities carry their own sign (controller output). `Forward` and
/// `Reverse` are used by joystick commands, whose wheel velocities are magnitudes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectionSign {
    Reverse,
    Signed,
    Forward,
}

/// Errors raised while decoding a drive payload.
#[derive(Debug, Error, PartialEq)]
pub enum PayloadError {
    #[error("The payload is not valid UTF-8")]
    NonUtf8,

    #[error("Expected 3 or 4 fields in the payload, found {0}")]
    FieldCount(usize),

    #[error("Could not parse field {0} ({1:?}) as a number")]
    InvalidField(usize, String),

    #[error("Direction field must be -1, 0 or 1, found {0}")]
    InvalidDirection(i64),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl WheelCommand {
    /// A command with both wheels stopped and no signal.
    pub const fn zero() -> Self {
        Self {
            left: 0.0,
            right: 0.0,
            signal: 0,
            direction: DirectionSign::Signed,
        }
    }

    /// Build a command from signed wheel velocities.
    pub fn signed(left: f64, right: f64) -> Self {
        Self {
            left,
            right,
            signal: 0,
            direction: DirectionSign::Signed,
        }
    }

    /// Return a copy of this command with the given signal set.
    pub fn with_signal(mut self, signal: u8) -> Self {
        self.signal = signal;
        self
    }

    /// True if neither wheel is demanded to move.
    pub fn is_stationary(&self) -> bool {
        self.left == 0.0 && self.right == 0.0
    }

    /// True if both velocities are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.left.is_finite() && self.right.is_finite()
    }

    /// Encode the command as the canonical four field ASCII payload.
    pub fn to_payload(&self) -> String {
        format!(
            "{:.3},{:.3},{},{}",
            self.left,
            self.right,
            self.direction.as_i8(),
            self.signal
        )
    }
}

impl Default for WheelCommand {
    fn default() -> Self {
        Self::zero()
    }
}

impl DirectionSign {
    /// Sign of the given value, zero maps to `Signed`.
    pub fn of(value: f64) -> Self {
        if value > 0.0 {
            DirectionSign::Forward
        } else if value < 0.0 {
            DirectionSign::Reverse
        } else {
            DirectionSign::Signed
        }
    }

    /// Integer representation used on the wire.
    pub fn as_i8(&self) -> i8 {
        match self {
            DirectionSign::Reverse => -1,
            DirectionSign::Signed => 0,
            DirectionSign::Forward => 1,
        }
    }

    fn from_wire(value: i64) -> Result<Self, PayloadError> {
        match value {
            -1 => Ok(DirectionSign::Reverse),
            0 => Ok(DirectionSign::Signed),
            1 => Ok(DirectionSign::Forward),
            v => Err(PayloadError::InvalidDirection(v)),
        }
    }
}

impl DriveDems {
    /// Decode a payload received by the drive peer.
    ///
    /// Both the four field and the legacy three field forms are accepted, whitespace around the
    /// fields is ignored. A non-zero signal field is clamped to `1`.
    pub fn from_payload(payload: &[u8]) -> Result<Self, PayloadError> {
        let text = std::str::from_utf8(payload).map_err(|_| PayloadError::NonUtf8)?;

        let fields: Vec<&str> = text.trim().split(',').map(|f| f.trim()).collect();

        let num = |i: usize| -> Result<f64, PayloadError> {
            fields[i]
                .parse::<f64>()
                .map_err(|_| PayloadError::InvalidField(i, fields[i].to_string()))
        };

        match fields.len() {
            3 => Ok(Self {
                left: num(0)?,
                right: num(1)?,
                signal: signal_from(num(2)?),
            }),
            4 => {
                let dir = fields[2]
                    .parse::<i64>()
                    .map_err(|_| PayloadError::InvalidField(2, fields[2].to_string()))
                    .and_then(DirectionSign::from_wire)?;
                let (left, right) = match dir {
                    DirectionSign::Signed => (num(0)?, num(1)?),
                    d => {
                        let s = d.as_i8() as f64;
                        (num(0)?.abs() * s, num(1)?.abs() * s)
                    }
                };
                Ok(Self {
                    left,
                    right,
                    signal: signal_from(num(3)?),
                })
            }
            n => Err(PayloadError::FieldCount(n)),
        }
    }

    /// Demands with both wheels stopped.
    pub fn stopped() -> Self {
        Self {
            left: 0.0,
            right: 0.0,
            signal: 0,
        }
    }
}

fn signal_from(value: f64) -> u8 {
    if value >= 1.0 {
        1
    } else {
        0
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
