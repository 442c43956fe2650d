//! # Link module
//!
//! The link module manages the lifecycle of the wireless link to the rover's drive peer: discovery
//! (scanning for a peer advertising the drive service), connection, service resolution and
//! automatic recovery after any disconnection.
//!
//! ```text
//!            start                  peer found                 resolved
//!   Idle ─────────────▶ Scanning ──────────────▶ Connecting ──────────────▶ Ready
//!    ▲                   │    ▲                      │                        │
//!    │ stop (any)        └────┘ window/retry         │ fail/timeout           │ lost
//!    │                                               ▼                        │
//!    └──────────────────────────────────────── Disconnected ◀─────────────────┘
//!                                                    │ (immediately)
//!                                                    └────────▶ Scanning
//! ```
//!
//! Transport callbacks are delivered as queued [`TransportEvent`]s and drained by
//! [`LinkMgr::process`] in the executable's cycle, so all link state mutation happens in a single
//! sequence through `&mut LinkMgr`.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod params;
mod state;
mod timer;
mod transport;

/// Simulated transport and drive peer
pub mod sim;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Serialize;

pub use params::*;
pub use state::*;
pub use timer::*;
pub use transport::*;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The state of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LinkState {
    /// Not started, or stopped by the operator.
    Idle,

    /// Looking for a peer advertising the drive service. Includes the wait between scan attempts.
    Scanning,

    /// Connecting to a peer and resolving its drive characteristic.
    Connecting,

    /// Connected and the drive characteristic is resolved, commands may be written.
    Ready,

    /// The connection was lost, the link rescans straight away.
    Disconnected,
}

/// Errors raised by the link.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize)]
pub enum LinkError {
    #[error("No radio adapter is available")]
    NoAdapter,

    #[error("The scan was rejected or failed: {0}")]
    ScanRejected(String),

    #[error("The connection was rejected or failed: {0}")]
    ConnectRejected(String),

    #[error("The peer did not complete the connection in time")]
    ConnectTimeout,

    #[error("The peer does not expose the expected service or characteristic: {0}")]
    ProtocolMismatch(String),

    #[error("Could not write to the drive characteristic: {0}")]
    WriteFailure(String),

    #[error("The link is not ready")]
    NotReady,
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A state change applied by the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub from: LinkState,
    pub to: LinkState,
}

/// Status of the link, for monitoring by the executable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkStatus {
    pub state: LinkState,

    /// The most recent error raised by the link.
    pub last_error: Option<LinkError>,

    /// Set when the last connected peer did not expose the drive characteristic.
    pub protocol_mismatch: bool,

    /// Address of the connected (or connecting) peer.
    pub peer: Option<PeerId>,

    /// Number of scans started.
    pub num_scans: u64,

    /// Number of times the link became ready.
    pub num_connections: u64,

    /// Number of times the link was lost.
    pub num_disconnections: u64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl LinkError {
    /// Only a missing adapter stops the link from recovering on its own.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, LinkError::NoAdapter)
    }
}

impl Default for LinkStatus {
    fn default() -> Self {
        Self {
            state: LinkState::Idle,
            last_error: None,
            protocol_mismatch: false,
            peer: None,
            num_scans: 0,
            num_connections: 0,
            num_disconnections: 0,
        }
    }
}
