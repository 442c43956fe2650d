//! Implementations for the ServoCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use nalgebra::Point2;
use serde::Serialize;

// Internal
use super::{frame_to_output, Params, ServoCtrlError};
use comms_if::eqpt::{
    drive::WheelCommand,
    vision::{FrameSize, MarkerPose, OutputSize},
};
use util::{maths::wrap_pi, module::State, params, session::Session};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Visual servo control module state
#[derive(Debug, Default)]
pub struct ServoCtrl {
    pub(crate) params: Params,

    pub(crate) report: StatusReport,
}

/// Input data to ServoCtrl.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputData {
    /// The marker detected in the latest frame, `None` if no marker was seen.
    pub pose: Option<MarkerPose>,

    /// Size of the frame `pose` was detected in.
    pub frame_size: FrameSize,

    /// The operator's target point, in the output space.
    pub target: Option<Point2<f64>>,

    /// Size of the output space.
    pub output_size: OutputSize,
}

/// Why a step produced the zero command without evaluating the control law.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    NoTarget,
    NoPose,
    InvalidFrame,
}

/// Status report for ServoCtrl processing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StatusReport {
    /// Set if the control law was not evaluated.
    pub skipped: Option<SkipReason>,

    /// Rover heading in the output space.
    ///
    /// Units: radians
    pub heading_rad: f64,

    /// Bearing from the rover centre to the target.
    ///
    /// Units: radians
    pub bearing_rad: f64,

    /// Heading error, in `(-pi, pi]`.
    ///
    /// Units: radians
    pub heading_err_rad: f64,

    /// Distance from the rover centre to the target.
    ///
    /// Units: output space pixels
    pub dist: f64,

    /// Forward speed demand.
    pub speed: f64,

    /// Turn rate demand.
    pub turn_rate: f64,

    /// The forward gate zeroed the speed.
    pub gated: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ServoCtrl {
    /// Create the module directly from a set of parameters.
    pub fn with_params(params: Params) -> Self {
        Self {
            params,
            report: StatusReport::default(),
        }
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    fn skip(&mut self, reason: SkipReason) -> (WheelCommand, StatusReport) {
        self.report.skipped = Some(reason);
        (WheelCommand::zero(), self.report)
    }
}

impl State for ServoCtrl {
    type InitData = &'static str;
    type InitError = params::LoadError;

    type InputData = InputData;
    type OutputData = WheelCommand;
    type StatusReport = StatusReport;
    type ProcError = ServoCtrlError;

    /// Initialise the ServoCtrl module.
    ///
    /// Expected init data is the path to the parameter file
    fn init(&mut self, init_data: Self::InitData, _session: &Session)
        -> Result<(), Self::InitError>
    {
        self.params = params::load(init_data)?;
        self.report = StatusReport::default();

        Ok(())
    }

    /// Compute the wheel command for the latest pose and target.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        // Clear the status report
        self.report = StatusReport::default();

        let target = match input_data.target {
            Some(t) => t,
            None => return Ok(self.skip(SkipReason::NoTarget)),
        };

        let pose = match input_data.pose {
            Some(p) => p,
            None => return Ok(self.skip(SkipReason::NoPose)),
        };

        if !input_data.frame_size.is_valid() {
            return Ok(self.skip(SkipReason::InvalidFrame));
        }

        let frame = &input_data.frame_size;
        let out = &input_data.output_size;

        let front = frame_to_output(pose.front(), frame, out);
        let rear = frame_to_output(pose.rear(), frame, out);
        let centre = frame_to_output(pose.centre(), frame, out);

        let axis = front - rear;
        let to_target = target - centre;

        let heading = axis.y.atan2(axis.x);
        let bearing = to_target.y.atan2(to_target.x);
        let err = wrap_pi(bearing - heading);

        let turn_rate = self.params.k_w * err;
        let dist = to_target.norm();
        let mut speed = self.params.k_v * dist;

        if let Some(gate) = self.params.forward_gate_rad {
            if err.abs() > gate {
                speed = 0.0;
                self.report.gated = true;
            }
        }

        let half_turn = turn_rate * self.params.wheelbase / 2.0;
        let cmd = WheelCommand::signed(speed + half_turn, speed - half_turn);

        self.report.heading_rad = heading;
        self.report.bearing_rad = bearing;
        self.report.heading_err_rad = err;
        self.report.dist = dist;
        self.report.speed = speed;
        self.report.turn_rate = turn_rate;

        if !cmd.is_finite() {
            return Err(ServoCtrlError::NonFiniteOutput(cmd.left, cmd.right));
        }

        trace!(
            "ServoCtrl: theta {:.3} e {:.3} d {:.1} -> left {:.3} right {:.3}",
            heading, err, dist, cmd.left, cmd.right
        );

        Ok((cmd, self.report))
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

    fn ctrl(gate: Option<f64>) -> ServoCtrl {
        ServoCtrl::with_params(Params {
            k_w: 0.6,
            k_v: 0.3,
            wheelbase: 100.0,
            forward_gate_rad: gate,
        })
    }

    /// Marker facing frame +x, front midpoint (10, 50), rear midpoint (0, 50).
    fn input(target: Option<Point2<f64>>) -> InputData {
        InputData {
            pose: Some(MarkerPose::from_axis(0, [10.0, 50.0], [0.0, 50.0], 5.0)),
            frame_size: FrameSize::new(100.0, 100.0),
            target,
            output_size: OutputSize::new(100.0, 100.0),
        }
    }

    #[test]
    fn test_turn_towards_target() {
        let mut sc = ctrl(Some(FRAC_PI_4));

        // Centre maps to (50, 5) in the output space, target is on its +x side
        let (cmd, rpt) = sc.proc(&input(Some(Point2::new(90.0, 5.0)))).unwrap();

        assert!((rpt.heading_rad - FRAC_PI_2).abs() < 1e-9);
        assert!((rpt.heading_err_rad + FRAC_PI_2).abs() < 1e-9);
        assert!(rpt.turn_rate < 0.0);
        assert!(rpt.gated);
        assert_eq!(rpt.speed, 0.0);
        assert!(cmd.right > cmd.left);
        assert_eq!(cmd.left, -cmd.right);
    }

    #[test]
    fn test_no_gate_keeps_speed() {
        let mut sc = ctrl(None);

        let (cmd, rpt) = sc.proc(&input(Some(Point2::new(90.0, 5.0)))).unwrap();

        assert!(!rpt.gated);
        assert!((rpt.speed - 0.3 * 40.0).abs() < 1e-9);
        assert!(cmd.right > cmd.left);
    }

    #[test]
    fn test_straight_ahead() {
        let mut sc = ctrl(Some(FRAC_PI_4));

        // Target along the heading
        let (cmd, rpt) = sc.proc(&input(Some(Point2::new(50.0, 85.0)))).unwrap();

        assert!(rpt.heading_err_rad.abs() < 1e-9);
        assert!((cmd.left - cmd.right).abs() < 1e-9);
        assert!((cmd.left - 0.3 * 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_target_at_centre_has_no_speed() {
        let mut sc = ctrl(None);

        let (_, rpt) = sc.proc(&input(Some(Point2::new(50.0, 5.0)))).unwrap();

        assert_eq!(rpt.dist, 0.0);
        assert_eq!(rpt.speed, 0.0);
    }

    #[test]
    fn test_skips() {
        let mut sc = ctrl(None);

        let (cmd, rpt) = sc.proc(&input(None)).unwrap();
        assert_eq!(cmd, WheelCommand::zero());
        assert_eq!(rpt.skipped, Some(SkipReason::NoTarget));

        let mut i = input(Some(Point2::new(1.0, 1.0)));
        i.pose = None;
        let (cmd, rpt) = sc.proc(&i).unwrap();
        assert_eq!(cmd, WheelCommand::zero());
        assert_eq!(rpt.skipped, Some(SkipReason::NoPose));

        let mut i = input(Some(Point2::new(1.0, 1.0)));
        i.frame_size = FrameSize::new(0.0, 100.0);
        let (cmd, rpt) = sc.proc(&i).unwrap();
        assert_eq!(cmd, WheelCommand::zero());
        assert_eq!(rpt.skipped, Some(SkipReason::InvalidFrame));
    }

    #[test]
    fn test_non_finite_is_error() {
        let mut sc = ctrl(None);

        let mut i = input(Some(Point2::new(1.0, 1.0)));
        i.target = Some(Point2::new(f64::INFINITY, 0.0));

        assert!(matches!(
            sc.proc(&i),
            Err(ServoCtrlError::NonFiniteOutput(_, _))
        ));
    }
}
