//! # Telecommand module
//!
//! This module provides the operator telecommands: the discrete inputs an operator gives to the
//! drive executable (tapping a target, moving the joystick, sounding the horn, starting or stopping
//! the link).
//!
//! Telecommands can be built from JSON, for example in scripts:
//!
//! ```text
//! {"type": "TAP", "payload": {"x": 540.0, "y": 1200.0}}
//! {"type": "HONK"}
//! ```
//!
//! or from command words in an interactive shell, for example `joy 0.2 -0.8`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};
use structopt::StructOpt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A telecommand, i.e. an instruction given by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, StructOpt)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tc {
    /// Tap on the output space. Sets the target if none is set, otherwise clears it.
    #[structopt(name = "tap")]
    Tap {
        /// Horizontal coordinate in the output space.
        #[structopt(allow_hyphen_values = true)]
        x: f64,

        /// Vertical coordinate in the output space.
        #[structopt(allow_hyphen_values = true)]
        y: f64,
    },

    /// Clear the target, if one is set.
    #[structopt(name = "clear")]
    ClearTarget,

    /// Move the joystick to the given position, switching to manual drive.
    #[structopt(name = "joy")]
    Joystick {
        /// Steering axis, -1 (full left) to +1 (full right).
        #[structopt(allow_hyphen_values = true)]
        x: f64,

        /// Throttle axis, -1 (full reverse) to +1 (full forward).
        #[structopt(allow_hyphen_values = true)]
        y: f64,
    },

    /// Release the joystick back to neutral.
    #[structopt(name = "centre")]
    Centre,

    /// Sound the horn once.
    #[structopt(name = "honk")]
    Honk,

    /// Start discovery of and connection to the drive peer.
    #[structopt(name = "link-start")]
    LinkStart,

    /// Stop the link, cancelling any discovery and disconnecting the peer.
    #[structopt(name = "link-stop")]
    LinkStop,
}

/// Possible parsing errors.
#[derive(Debug, Error)]
pub enum TcParseError {
    #[error("TC contains invalid JSON: {0}")]
    InvalidJson(serde_json::Error),

    #[error("TC could not be parsed from the command words: {0}")]
    InvalidWords(String),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Tc {
    /// Parse a new TC from a JSON packet
    pub fn from_json(json_str: &str) -> Result<Self, TcParseError> {
        serde_json::from_str(json_str).map_err(TcParseError::InvalidJson)
    }

    /// Parse a new TC from whitespace separated command words, such as `tap 100 200`.
    pub fn from_words(line: &str) -> Result<Self, TcParseError> {
        // structopt expects the binary name as the first word
        let words = std::iter::once("tc").chain(line.split_whitespace());

        Tc::from_iter_safe(words).map_err(|e| TcParseError::InvalidWords(e.message))
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
