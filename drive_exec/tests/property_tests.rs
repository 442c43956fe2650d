//! Property tests for the controller, the angle wrapping, the command throttle and the link's
//! recovery.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::f64::consts::PI;
use std::time::{Duration, Instant};

use proptest::prelude::*;

use comms_if::eqpt::{
    drive::WheelCommand,
    vision::{FrameSize, MarkerPose, OutputSize},
};
use drive_lib::{
    cmd_channel::CommandChannel,
    link::{
        sim::{SimPeerConfig, SimTransport},
        LinkError, LinkMgr, LinkParams,
    },
    servo_ctrl::{frame_to_output, InputData, Params, ServoCtrl},
};
use util::{maths::wrap_pi, module::State};

// ------------------------------------------------------------------------------------------------
// HELPERS
// ------------------------------------------------------------------------------------------------

fn ctrl() -> ServoCtrl {
    ServoCtrl::with_params(Params {
        k_w: 0.6,
        k_v: 0.3,
        wheelbase: 100.0,
        forward_gate_rad: Some(PI / 4.0),
    })
}

fn pose() -> impl Strategy<Value = MarkerPose> {
    (0.0..640.0f64, 0.0..480.0f64, -PI..PI, 1.0..80.0f64, 1.0..40.0f64).prop_map(
        |(cx, cy, angle, len, half_width)| {
            let (dx, dy) = (angle.cos() * len / 2.0, angle.sin() * len / 2.0);
            MarkerPose::from_axis(0, [cx + dx, cy + dy], [cx - dx, cy - dy], half_width)
        },
    )
}

#[derive(Debug, Clone)]
enum LinkOp {
    Drop,
    Reachable(bool),
    Start,
    Stop,
    Advance(u64),
}

fn link_op() -> impl Strategy<Value = LinkOp> {
    prop_oneof![
        Just(LinkOp::Drop),
        any::<bool>().prop_map(LinkOp::Reachable),
        Just(LinkOp::Start),
        Just(LinkOp::Stop),
        (0u64..12_000).prop_map(LinkOp::Advance),
    ]
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

proptest! {
    #[test]
    fn wrapped_angle_in_half_open_range(angle in -1000.0..1000.0f64) {
        let w = wrap_pi(angle);

        prop_assert!(w > -PI && w <= PI, "{} wrapped to {}", angle, w);

        // Same direction as the input
        prop_assert!((w.sin() - angle.sin()).abs() < 1e-6);
        prop_assert!((w.cos() - angle.cos()).abs() < 1e-6);
    }

    #[test]
    fn target_at_centre_has_no_speed(p in pose()) {
        let frame = FrameSize::new(640.0, 480.0);
        let out = OutputSize::new(1080.0, 1920.0);
        let target = frame_to_output(p.centre(), &frame, &out);

        let (_, rpt) = ctrl()
            .proc(&InputData {
                pose: Some(p),
                frame_size: frame,
                target: Some(target),
                output_size: out,
            })
            .unwrap();

        prop_assert_eq!(rpt.speed, 0.0);
        prop_assert!(rpt.heading_err_rad > -PI && rpt.heading_err_rad <= PI);
    }

    #[test]
    fn no_target_is_zero_command(p in pose(), w in 0.0..2000.0f64, h in 0.0..2000.0f64) {
        let (cmd, _) = ctrl()
            .proc(&InputData {
                pose: Some(p),
                frame_size: FrameSize::new(w, h),
                target: None,
                output_size: OutputSize::new(1080.0, 1920.0),
            })
            .unwrap();

        prop_assert_eq!(cmd, WheelCommand::zero());
    }

    #[test]
    fn unforced_sends_respect_interval(
        steps in proptest::collection::vec((1u64..30, any::<bool>()), 1..100)
    ) {
        let t0 = Instant::now();
        let params = LinkParams::default();
        let mut link = LinkMgr::new(
            params.clone(),
            SimTransport::new(SimPeerConfig::drive_peer(&params)),
        );
        link.start(t0);
        link.process(t0);
        prop_assert!(link.is_ready());

        let mut channel = CommandChannel::new(Duration::from_millis(50));
        let cmd = WheelCommand::signed(10.0, 10.0);

        let mut t = t0;
        let mut last_sent: Option<Instant> = None;

        for (dt, force) in steps {
            t += Duration::from_millis(dt);
            let sent = channel.try_send(&mut link, &cmd, force, t).is_sent();

            if force {
                prop_assert!(sent);
            } else if sent {
                if let Some(last) = last_sent {
                    prop_assert!(t - last >= Duration::from_millis(50));
                }
            }

            if sent {
                last_sent = Some(t);
            }
        }

        prop_assert_eq!(link.transport().writes().len() as u64, channel.num_sent());
    }

    #[test]
    fn link_always_recovers(ops in proptest::collection::vec(link_op(), 0..40)) {
        let params = LinkParams::default();
        let mut link = LinkMgr::new(
            params.clone(),
            SimTransport::new(SimPeerConfig::drive_peer(&params)),
        );

        let mut t = Instant::now();

        for op in ops {
            match op {
                LinkOp::Drop => link.transport_mut().drop_link(),
                LinkOp::Reachable(r) => link.transport_mut().set_reachable(r),
                LinkOp::Start => {
                    link.start(t);
                }
                LinkOp::Stop => {
                    link.stop();
                }
                LinkOp::Advance(ms) => t += Duration::from_millis(ms),
            }
            link.process(t);

            if !link.is_ready() {
                prop_assert_eq!(link.write(b"0,0,0,0"), Err(LinkError::NotReady));
            }
        }

        // Peer back in range, the link finds it without further operator action
        link.transport_mut().set_reachable(true);
        link.start(t);

        for _ in 0..10 {
            if link.is_ready() {
                break;
            }
            t += Duration::from_millis(6_000);
            link.process(t);
            link.process(t);
        }

        prop_assert!(link.is_ready(), "link stuck in {:?}", link.state());
    }
}
