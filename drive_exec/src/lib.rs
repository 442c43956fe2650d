//! # Drive library.
//!
//! This library allows other crates in the workspace, and the integration tests, to access items
//! defined inside the drive crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Command channel - throttles and encodes wheel commands onto the link
pub mod cmd_channel;

/// Joystick mixer - converts stick positions into wheel commands for manual driving
pub mod joystick;

/// Link - discovers, connects to and recovers the wireless drive peer
pub mod link;

/// Orchestrator - ties operator input, the controller and the link together each cycle
pub mod orchestrator;

/// Drive executable parameters
pub mod params;

/// Relay client - posts manual controls to the relay server
pub mod relay_client;

/// Visual servo control - steers the rover towards the operator's target
pub mod servo_ctrl;
