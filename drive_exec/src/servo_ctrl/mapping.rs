//! Frame to output space mapping
//!
//! The camera frame is rotated a quarter turn relative to the output space:
//!
//! ```text
//! out_x = (1 - frame_y / frame_h) * out_w
//! out_y = (frame_x / frame_w) * out_h
//! ```

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Point2;

use comms_if::eqpt::vision::{FrameSize, OutputSize};
use util::maths::lin_map;

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Map a point in frame pixels into the output space.
///
/// The frame must be valid (both dimensions non-zero).
pub fn frame_to_output(point: Point2<f64>, frame: &FrameSize, output: &OutputSize) -> Point2<f64> {
    Point2::new(
        lin_map((0.0, frame.height), (output.width, 0.0), point.y),
        lin_map((0.0, frame.width), (0.0, output.height), point.x),
    )
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
