//! # Vision Equipment Interface
//!
//! Data produced by the vision collaborator, which detects the fiducial marker mounted on the rover
//! in each analysed camera frame.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A single detected marker in frame pixel coordinates.
///
/// Corners are ordered top-left, top-right, bottom-right, bottom-left, as produced by the marker
/// detector. The "top" edge of the marker is mounted towards the front of the rover.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarkerPose {
    /// Marker identifier from the detector dictionary.
    pub id: i32,

    /// The four corners of the marker.
    ///
    /// Units: pixels,
    /// Frame: Camera frame
    pub corners_px: [[f64; 2]; 4],
}

/// Dimensions of an analysed camera frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: f64,
    pub height: f64,
}

/// Dimensions of the output (display/control) space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OutputSize {
    pub width: f64,
    pub height: f64,
}

/// Result of analysing one frame: the detected marker, if any, and the frame dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameSample {
    pub pose: Option<MarkerPose>,
    pub frame_size: FrameSize,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MarkerPose {
    /// Build a pose from its front midpoint, rear midpoint and half width.
    ///
    /// Mostly useful to synthesise detections in simulation and tests.
    pub fn from_axis(id: i32, front: [f64; 2], rear: [f64; 2], half_width: f64) -> Self {
        let dx = front[0] - rear[0];
        let dy = front[1] - rear[1];
        let len = (dx * dx + dy * dy).sqrt();

        // Unit normal to the rear->front axis
        let (nx, ny) = if len > 0.0 {
            (-dy / len * half_width, dx / len * half_width)
        } else {
            (0.0, 0.0)
        };

        Self {
            id,
            corners_px: [
                [front[0] + nx, front[1] + ny],
                [front[0] - nx, front[1] - ny],
                [rear[0] - nx, rear[1] - ny],
                [rear[0] + nx, rear[1] + ny],
            ],
        }
    }

    /// Midpoint of the top (front) edge.
    pub fn front(&self) -> Point2<f64> {
        midpoint(self.corners_px[0], self.corners_px[1])
    }

    /// Midpoint of the bottom (rear) edge.
    pub fn rear(&self) -> Point2<f64> {
        midpoint(self.corners_px[2], self.corners_px[3])
    }

    /// Mean of the four corners.
    pub fn centre(&self) -> Point2<f64> {
        let c = &self.corners_px;
        Point2::new(
            (c[0][0] + c[1][0] + c[2][0] + c[3][0]) / 4.0,
            (c[0][1] + c[1][1] + c[2][1] + c[3][1]) / 4.0,
        )
    }

    /// Area enclosed by the corners.
    ///
    /// Units: pixels^2
    pub fn area_px(&self) -> f64 {
        let c = &self.corners_px;
        let mut sum = 0.0;
        for i in 0..4 {
            let j = (i + 1) % 4;
            sum += c[i][0] * c[j][1] - c[j][0] * c[i][1];
        }
        sum.abs() / 2.0
    }
}

impl FrameSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// A frame can only be mapped if both dimensions are strictly positive.
    pub fn is_valid(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

impl OutputSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

impl FrameSample {
    /// A frame in which no marker was detected.
    pub fn empty(frame_size: FrameSize) -> Self {
        Self {
            pose: None,
            frame_size,
        }
    }
}

fn midpoint(a: [f64; 2], b: [f64; 2]) -> Point2<f64> {
    Point2::new((a[0] + b[0]) / 2.0, (a[1] + b[1]) / 2.0)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
