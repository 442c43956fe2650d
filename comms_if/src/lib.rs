//! # Communications interface crate.
//!
//! Provides all common communications interfaces for the software.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Operator telecommands
pub mod tc;

/// Command and data definitions for equipment (the rover drive and the vision collaborator)
pub mod eqpt;

/// Bodies exchanged with the control relay server
pub mod relay;

/// Network module
pub mod net;
