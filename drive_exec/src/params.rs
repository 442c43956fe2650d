//! # Drive Executable Parameters
//!
//! This module provide parameters for the drive executable.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::Duration;

use serde::{Deserialize, Serialize};

use comms_if::eqpt::vision::OutputSize;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveExecParams {
    /// Target period of one cycle.
    ///
    /// Units: seconds
    pub cycle_period_s: f64,

    /// Size of the space targets are given in.
    pub output_size: OutputSize,

    /// Minimum interval between commands written to the drive link.
    pub device_interval_ms: u64,

    /// Minimum interval between controls posted to the relay.
    pub relay_interval_ms: u64,

    /// `host:port` of the relay server, manual controls are not relayed if unset.
    #[serde(default)]
    pub relay_endpoint: Option<String>,

    /// Timeout of a single relay post.
    pub relay_timeout_ms: u64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl DriveExecParams {
    pub fn device_interval(&self) -> Duration {
        Duration::from_millis(self.device_interval_ms)
    }

    pub fn relay_interval(&self) -> Duration {
        Duration::from_millis(self.relay_interval_ms)
    }

    pub fn relay_timeout(&self) -> Duration {
        Duration::from_millis(self.relay_timeout_ms)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
