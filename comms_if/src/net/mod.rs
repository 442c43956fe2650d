//! # Network Module
//!
//! This module provides the networking used between the executables. Relay traffic is small JSON
//! bodies over HTTP, see [`client::RelayClient`].

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod client;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use client::{NetError, RelayClient};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Route accepting [`crate::relay::ControlRecord`] posts.
pub const CONTROL_ROUTE: &str = "/control";

/// Route serving the control log.
pub const LOGS_ROUTE: &str = "/logs";
