//! # Relay Interface
//!
//! JSON bodies exchanged with the HTTP relay server.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A manual control sample, body of `POST /control`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlRecord {
    /// Steering axis in `[-1, 1]`.
    pub x: f64,

    /// Throttle axis in `[-1, 1]`.
    pub y: f64,

    /// `1` to sound the horn, `0` otherwise.
    #[serde(default)]
    pub honk: u8,
}

/// One entry of the control log, as returned by `GET /logs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// UTC time the control was received, formatted `HH:MM:SS`.
    pub time: String,
    pub x: f64,
    pub y: f64,
}

/// Reply to a control post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq)]
pub enum ControlError {
    #[error("Axis {0} out of range [-1, 1]: {1}")]
    AxisOutOfRange(&'static str, f64),

    #[error("Honk must be 0 or 1, found {0}")]
    InvalidHonk(u8),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ControlRecord {
    pub fn new(x: f64, y: f64, honk: bool) -> Self {
        Self {
            x,
            y,
            honk: honk as u8,
        }
    }

    /// Check the record is within the ranges accepted by the relay.
    pub fn validate(&self) -> Result<(), ControlError> {
        if !(-1.0..=1.0).contains(&self.x) {
            return Err(ControlError::AxisOutOfRange("x", self.x));
        }
        if !(-1.0..=1.0).contains(&self.y) {
            return Err(ControlError::AxisOutOfRange("y", self.y));
        }
        if self.honk > 1 {
            return Err(ControlError::InvalidHonk(self.honk));
        }

        Ok(())
    }

    /// True if the stick is at rest and no honk is requested.
    pub fn is_neutral(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.honk == 0
    }
}

impl StatusResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".into(),
            error: None,
        }
    }

    pub fn error<S: Into<String>>(msg: S) -> Self {
        Self {
            status: "error".into(),
            error: Some(msg.into()),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
