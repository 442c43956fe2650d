//! # Equipment Interface
//!
//! This module defines the interface structures which are exchanged with equipment: the rover's
//! drive peer and the vision collaborator that detects the rover's marker.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod drive;
pub mod vision;
