//! Parameters structure for the link

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::time::Duration;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the link.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LinkParams {

    // ---- DISCOVERY ----

    /// UUID of the GATT service advertised by the drive peer.
    pub service_uuid: String,

    /// UUID of the writable characteristic within the drive service.
    pub characteristic_uuid: String,

    /// Name the drive peer advertises under, used for logging.
    pub device_name: String,

    // ---- TIMING ----

    /// How long a single scan runs before it is stopped.
    ///
    /// Units: milliseconds
    pub scan_window_ms: u64,

    /// Delay between a scan stopping without finding the peer and the next scan starting.
    ///
    /// Units: milliseconds
    pub retry_delay_ms: u64,

    /// Maximum time between requesting a connection and the characteristic being resolved.
    ///
    /// Units: milliseconds
    pub connect_timeout_ms: u64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl LinkParams {
    pub fn scan_window(&self) -> Duration {
        Duration::from_millis(self.scan_window_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for LinkParams {
    fn default() -> Self {
        Self {
            service_uuid: "12345678-1234-1234-1234-1234567890ab".into(),
            characteristic_uuid: "abcd1234-1234-1234-1234-abcdef123456".into(),
            device_name: "CarRover".into(),
            scan_window_ms: 10_000,
            retry_delay_ms: 1_000,
            connect_timeout_ms: 5_000,
        }
    }
}
