//! Parameters structure for ServoCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for visual servo control.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Params {

    // ---- GAINS ----

    /// Proportional gain from heading error to turn rate.
    pub k_w: f64,

    /// Proportional gain from distance to target to forward speed.
    pub k_v: f64,

    // ---- GEOMETRY ----

    /// Distance between the wheels.
    ///
    /// Units: output space pixels
    pub wheelbase: f64,

    // ---- BEHAVIOUR ----

    /// If set, the forward speed is zeroed while the absolute heading error
    /// exceeds this angle, so the rover turns on the spot towards the target.
    ///
    /// Units: radians
    #[serde(default)]
    pub forward_gate_rad: Option<f64>,
}
