//! Visual servo control module
//!
//! Drives the rover towards a target point in the output space, using the pose of the marker
//! detected on the rover in the latest camera frame.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod mapping;
mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use mapping::*;
pub use params::*;
pub use state::*;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during ServoCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum ServoCtrlError {
    #[error("Computed a non-finite wheel command (left: {0}, right: {1})")]
    NonFiniteOutput(f64, f64),
}
