//! # Orchestrator
//!
//! Owns the link, the command channel, the controller and the operator state (target, drive mode,
//! joystick). Each call to [`Orchestrator::step`] processes link events and timers, then computes
//! and dispatches at most one wheel command.
//!
//! Stop guarantee: a stationary command is always sent forced, once, after any motion. If the link
//! is not ready the stop stays pending and is forced on the next step the link is ready. No other
//! command is ever queued: a honk lives for one step and carries that step's command, or a zero
//! command when nothing was computed.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::Instant;

use log::{debug, error, info, warn};
use nalgebra::Point2;
use serde::Serialize;

use comms_if::{
    eqpt::{
        drive::WheelCommand,
        vision::{FrameSample, OutputSize},
    },
    relay::ControlRecord,
    tc::Tc,
};
use util::module::State;

use crate::{
    cmd_channel::{CommandChannel, SendOutcome},
    joystick::JoystickMixer,
    link::{LinkMgr, LinkState, LinkTransport, Transition},
    relay_client::RelayPath,
    servo_ctrl::{self, ServoCtrl},
};

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Where wheel commands come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DriveMode {
    /// Visual servoing towards the operator's target.
    Servo,

    /// Joystick.
    Manual,
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct Orchestrator<T: LinkTransport> {
    link: LinkMgr<T>,
    channel: CommandChannel,
    relay: Option<RelayPath>,

    servo_ctrl: ServoCtrl,
    mixer: JoystickMixer,
    output_size: OutputSize,

    mode: DriveMode,
    target: Option<Point2<f64>>,
    frame: Option<FrameSample>,
    stick: (f64, f64),

    /// Last command computed.
    last_cmd: WheelCommand,

    /// A stationary command reached the transport after the last motion command.
    stop_delivered: bool,

    honk_pending: bool,

    relay_force_pending: bool,
    relay_honk_pending: bool,
    last_relayed: Option<ControlRecord>,
}

/// What happened during one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub transitions: Vec<Transition>,
    pub link_state: LinkState,
    pub mode: DriveMode,

    /// The command offered to the channel, if any.
    pub command: Option<WheelCommand>,

    #[serde(skip)]
    pub outcome: Option<SendOutcome>,

    /// Report from the controller if it ran this step.
    pub servo: Option<servo_ctrl::StatusReport>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<T: LinkTransport> Orchestrator<T> {
    pub fn new(
        link: LinkMgr<T>,
        channel: CommandChannel,
        servo_ctrl: ServoCtrl,
        mixer: JoystickMixer,
        output_size: OutputSize,
    ) -> Self {
        Self {
            link,
            channel,
            relay: None,
            servo_ctrl,
            mixer,
            output_size,
            mode: DriveMode::Servo,
            target: None,
            frame: None,
            stick: (0.0, 0.0),
            last_cmd: WheelCommand::zero(),
            stop_delivered: false,
            honk_pending: false,
            relay_force_pending: false,
            relay_honk_pending: false,
            last_relayed: None,
        }
    }

    /// Post manual controls to the given relay path.
    pub fn with_relay(mut self, relay: RelayPath) -> Self {
        self.relay = Some(relay);
        self
    }

    /// Handle an operator telecommand.
    pub fn handle_tc(&mut self, tc: &Tc, now: Instant) -> Vec<Transition> {
        debug!("Handling {:?}", tc);

        match *tc {
            Tc::Tap { x, y } => {
                if self.mode == DriveMode::Manual {
                    info!("Switching to servo mode");
                    self.mode = DriveMode::Servo;
                    self.stick = (0.0, 0.0);
                }

                self.target = match self.target {
                    Some(_) => {
                        info!("Target cleared");
                        None
                    }
                    None => {
                        info!("Target set to ({:.1}, {:.1})", x, y);
                        Some(Point2::new(x, y))
                    }
                };
            }
            Tc::ClearTarget => {
                if self.target.take().is_some() {
                    info!("Target cleared");
                }
            }
            Tc::Joystick { x, y } => {
                if self.mode == DriveMode::Servo {
                    info!("Switching to manual mode");
                    self.mode = DriveMode::Manual;
                    self.target = None;
                }
                self.stick = (JoystickMixer::quantise(x), JoystickMixer::quantise(y));
            }
            Tc::Centre => {
                self.stick = (0.0, 0.0);
                self.relay_force_pending = true;
            }
            Tc::Honk => {
                self.honk_pending = true;
                if self.mode == DriveMode::Manual {
                    self.relay_force_pending = true;
                    self.relay_honk_pending = true;
                }
            }
            Tc::LinkStart => return self.link.start(now),
            Tc::LinkStop => return self.stop(now),
        }

        Vec::new()
    }

    /// Replace the latest frame sample. Older unprocessed samples are dropped.
    pub fn submit_frame(&mut self, sample: FrameSample) {
        self.frame = Some(sample);
    }

    /// Process the link and dispatch at most one command.
    pub fn step(&mut self, now: Instant) -> StepReport {
        let transitions = self.link.process(now);

        if transitions.iter().any(|t| t.to == LinkState::Ready) {
            // Peer state unknown after a (re)connection
            self.stop_delivered = false;
        }

        let mut servo = None;
        let computed = match self.mode {
            DriveMode::Manual => Some(self.mixer.mix(self.stick.0, self.stick.1)),
            DriveMode::Servo => self.servo_step(&mut servo),
        };

        if let Some(c) = computed {
            self.last_cmd = c;
        }

        // A stop that could not be delivered is retried even without a new sample
        let candidate = computed.or_else(|| {
            if self.last_cmd.is_stationary() && !self.stop_delivered {
                Some(self.last_cmd)
            } else {
                None
            }
        });

        let (command, outcome) = if std::mem::take(&mut self.honk_pending) {
            let cmd = computed.unwrap_or_else(WheelCommand::zero).with_signal(1);
            let outcome = self.dispatch(&cmd, true, now);
            if !outcome.is_sent() {
                warn!("Honk dropped: {:?}", outcome);
            }
            (Some(cmd), Some(outcome))
        } else {
            match candidate {
                Some(cmd) if cmd.is_stationary() && self.stop_delivered => (None, None),
                Some(cmd) => {
                    let force = cmd.is_stationary();
                    (Some(cmd), Some(self.dispatch(&cmd, force, now)))
                }
                None => (None, None),
            }
        };

        if self.mode == DriveMode::Manual {
            self.relay_step(now);
        }

        StepReport {
            transitions,
            link_state: self.link.state(),
            mode: self.mode,
            command,
            outcome,
            servo,
        }
    }

    pub fn start(&mut self, now: Instant) -> Vec<Transition> {
        self.link.start(now)
    }

    /// Force a zero command if the link is ready, then stop the link.
    ///
    /// If the zero command cannot be delivered it stays pending as any other stop.
    pub fn stop(&mut self, now: Instant) -> Vec<Transition> {
        self.last_cmd = WheelCommand::zero();
        self.honk_pending = false;

        if self.link.state() == LinkState::Ready {
            let outcome = self.dispatch(&WheelCommand::zero(), true, now);
            if !outcome.is_sent() {
                warn!("Could not send the final stop: {:?}", outcome);
            }
        }

        self.link.stop()
    }

    pub fn link(&self) -> &LinkMgr<T> {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut LinkMgr<T> {
        &mut self.link
    }

    pub fn channel(&self) -> &CommandChannel {
        &self.channel
    }

    pub fn relay(&self) -> Option<&RelayPath> {
        self.relay.as_ref()
    }

    pub fn relay_mut(&mut self) -> Option<&mut RelayPath> {
        self.relay.as_mut()
    }

    pub fn mode(&self) -> DriveMode {
        self.mode
    }

    pub fn target(&self) -> Option<Point2<f64>> {
        self.target
    }

    /// A stop still has to reach the transport.
    pub fn stop_pending(&self) -> bool {
        self.last_cmd.is_stationary() && !self.stop_delivered
    }

    // ---- PRIVATE ----

    fn servo_step(&mut self, report: &mut Option<servo_ctrl::StatusReport>) -> Option<WheelCommand> {
        // Without a target the command is zero whether or not a frame arrived
        if self.target.is_none() {
            self.frame = None;
            return Some(WheelCommand::zero());
        }

        let sample = self.frame.take()?;

        let input = servo_ctrl::InputData {
            pose: sample.pose,
            frame_size: sample.frame_size,
            target: self.target,
            output_size: self.output_size,
        };

        match self.servo_ctrl.proc(&input) {
            Ok((cmd, rpt)) => {
                *report = Some(rpt);
                Some(cmd)
            }
            Err(e) => {
                error!("ServoCtrl error, stopping: {}", e);
                Some(WheelCommand::zero())
            }
        }
    }

    fn dispatch(&mut self, cmd: &WheelCommand, force: bool, now: Instant) -> SendOutcome {
        let outcome = self.channel.try_send(&mut self.link, cmd, force, now);

        if outcome.is_sent() {
            self.stop_delivered = cmd.is_stationary();
        }

        outcome
    }

    fn relay_step(&mut self, now: Instant) {
        let relay = match self.relay {
            Some(ref mut r) => r,
            None => return,
        };

        let record = ControlRecord::new(self.stick.0, self.stick.1, self.relay_honk_pending);
        let changed = self.last_relayed.map_or(true, |r| r != record);

        if !changed && !self.relay_force_pending {
            return;
        }

        if relay.offer(&record, self.relay_force_pending, now) {
            self.relay_force_pending = false;
            self.relay_honk_pending = false;
            self.last_relayed = Some(record);
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        joystick::JoystickParams,
        link::{
            sim::{SimPeerConfig, SimTransport},
            LinkParams,
        },
        relay_client::{RelayError, RelaySink},
        servo_ctrl::Params,
    };
    use comms_if::eqpt::vision::{FrameSize, MarkerPose};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct Recorder(Arc<Mutex<Vec<ControlRecord>>>);

    impl RelaySink for Recorder {
        fn post(&mut self, record: &ControlRecord) -> Result<(), RelayError> {
            self.0.lock().unwrap().push(*record);
            Ok(())
        }
    }

    fn orchestrator() -> Orchestrator<SimTransport> {
        let params = LinkParams::default();
        let link = LinkMgr::new(
            params.clone(),
            SimTransport::new(SimPeerConfig::drive_peer(&params)),
        );
        let servo = ServoCtrl::with_params(Params {
            k_w: 0.6,
            k_v: 0.3,
            wheelbase: 100.0,
            forward_gate_rad: Some(std::f64::consts::FRAC_PI_4),
        });
        let mixer = JoystickMixer::new(JoystickParams {
            max_speed: 200.0,
            drift_factor: 0.5,
        });

        Orchestrator::new(
            link,
            CommandChannel::new(Duration::from_millis(50)),
            servo,
            mixer,
            OutputSize::new(100.0, 100.0),
        )
    }

    fn sample() -> FrameSample {
        FrameSample {
            pose: Some(MarkerPose::from_axis(0, [10.0, 50.0], [0.0, 50.0], 5.0)),
            frame_size: FrameSize::new(100.0, 100.0),
        }
    }

    fn ms(t: Instant, ms: u64) -> Instant {
        t + Duration::from_millis(ms)
    }

    fn wait_posted(o: &Orchestrator<SimTransport>, n: u64) {
        let start = Instant::now();
        while o.relay().map_or(0, |r| r.num_posted()) < n {
            assert!(start.elapsed() < Duration::from_secs(2), "relay worker timed out");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn writes(o: &Orchestrator<SimTransport>) -> Vec<String> {
        o.link()
            .transport()
            .writes()
            .iter()
            .map(|w| String::from_utf8_lossy(w).into_owned())
            .collect()
    }

    #[test]
    fn test_tap_toggles_target() {
        let t0 = Instant::now();
        let mut o = orchestrator();

        o.handle_tc(&Tc::Tap { x: 1.0, y: 2.0 }, t0);
        assert_eq!(o.target(), Some(Point2::new(1.0, 2.0)));

        o.handle_tc(&Tc::Tap { x: 5.0, y: 5.0 }, t0);
        assert_eq!(o.target(), None);

        o.handle_tc(&Tc::Tap { x: 5.0, y: 5.0 }, t0);
        o.handle_tc(&Tc::ClearTarget, t0);
        assert_eq!(o.target(), None);
    }

    #[test]
    fn test_idle_sends_one_stop() {
        let t0 = Instant::now();
        let mut o = orchestrator();

        // Link not started, the stop stays pending
        let rpt = o.step(t0);
        assert_eq!(rpt.outcome, Some(SendOutcome::LinkNotReady));
        assert!(o.stop_pending());

        o.handle_tc(&Tc::LinkStart, t0);
        for i in 1..10 {
            o.step(ms(t0, i * 10));
        }

        assert_eq!(writes(&o), vec!["0.000,0.000,0,0".to_string()]);
        assert!(!o.stop_pending());
    }

    #[test]
    fn test_servo_sends_throttled() {
        let t0 = Instant::now();
        let mut o = orchestrator();
        o.handle_tc(&Tc::LinkStart, t0);
        o.step(t0);

        o.handle_tc(&Tc::Tap { x: 90.0, y: 5.0 }, t0);

        for i in 1..=10 {
            o.submit_frame(sample());
            let rpt = o.step(ms(t0, i * 10));
            assert!(rpt.servo.is_some());
        }

        // Initial stop, then one motion command per 50 ms window
        let w = writes(&o);
        assert_eq!(w.len(), 3);
        assert_eq!(w[0], "0.000,0.000,0,0");
        assert!(w[1].ends_with(",0,0"));
    }

    #[test]
    fn test_no_new_frame_sends_nothing() {
        let t0 = Instant::now();
        let mut o = orchestrator();
        o.handle_tc(&Tc::LinkStart, t0);
        o.step(t0);
        o.handle_tc(&Tc::Tap { x: 90.0, y: 5.0 }, t0);

        let rpt = o.step(ms(t0, 100));
        assert_eq!(rpt.command, None);
        assert_eq!(rpt.outcome, None);
    }

    #[test]
    fn test_honk_is_forced_once() {
        let t0 = Instant::now();
        let mut o = orchestrator();
        o.handle_tc(&Tc::LinkStart, t0);
        o.step(t0);

        o.handle_tc(&Tc::Honk, t0);
        let rpt = o.step(ms(t0, 1));
        assert!(rpt.outcome.map_or(false, |s| s.is_sent()));
        o.step(ms(t0, 2));
        o.step(ms(t0, 100));

        assert_eq!(
            writes(&o),
            vec!["0.000,0.000,0,0".to_string(), "0.000,0.000,0,1".to_string()]
        );
    }

    #[test]
    fn test_honk_while_link_down_is_dropped() {
        let t0 = Instant::now();
        let mut o = orchestrator();
        o.handle_tc(&Tc::LinkStart, t0);
        o.step(t0);

        o.handle_tc(&Tc::Tap { x: 90.0, y: 5.0 }, t0);
        o.submit_frame(sample());
        assert!(o.step(ms(t0, 50)).outcome.map_or(false, |s| s.is_sent()));

        // Stopping the link sends a zero command first
        o.handle_tc(&Tc::LinkStop, ms(t0, 60));
        assert_eq!(o.link().state(), LinkState::Idle);

        o.handle_tc(&Tc::Honk, ms(t0, 60));
        let rpt = o.step(ms(t0, 260));
        assert_eq!(rpt.outcome, Some(SendOutcome::LinkNotReady));

        for i in 2..=100 {
            assert_eq!(o.step(ms(t0, 60 + i * 200)).outcome, None);
        }

        // 20 s later, no fresh frame: only the stop goes out again
        o.handle_tc(&Tc::LinkStart, ms(t0, 20_100));
        for i in 0..10 {
            o.step(ms(t0, 20_100 + i * 10));
        }

        let w = writes(&o);
        assert_eq!(w.len(), 4);
        assert_eq!(w[0], "0.000,0.000,0,0");
        assert!(w[1].ends_with(",0,0") && w[1] != w[0]);
        assert_eq!(w[2], "0.000,0.000,0,0");
        assert_eq!(w[3], "0.000,0.000,0,0");
    }

    #[test]
    fn test_honk_carries_this_steps_command() {
        let t0 = Instant::now();
        let mut o = orchestrator();
        o.handle_tc(&Tc::LinkStart, t0);
        o.step(t0);
        o.handle_tc(&Tc::Tap { x: 90.0, y: 5.0 }, t0);

        o.submit_frame(sample());
        let motion = o.step(ms(t0, 50)).command.unwrap();

        o.handle_tc(&Tc::Honk, ms(t0, 60));
        o.submit_frame(sample());
        let rpt = o.step(ms(t0, 70));
        assert_eq!(rpt.command, Some(motion.with_signal(1)));
        assert!(rpt.outcome.map_or(false, |s| s.is_sent()));
    }

    #[test]
    fn test_link_stop_forces_zero_command() {
        let t0 = Instant::now();
        let mut o = orchestrator();
        o.handle_tc(&Tc::LinkStart, t0);
        o.step(t0);

        o.handle_tc(&Tc::Joystick { x: 0.0, y: 1.0 }, t0);
        assert!(o.step(ms(t0, 50)).outcome.map_or(false, |s| s.is_sent()));

        // Inside the throttle window
        o.stop(ms(t0, 60));

        assert_eq!(o.link().state(), LinkState::Idle);
        assert_eq!(
            writes(&o),
            vec![
                "0.000,0.000,0,0".to_string(),
                "200.000,200.000,1,0".to_string(),
                "0.000,0.000,0,0".to_string(),
            ]
        );
    }

    #[test]
    fn test_manual_mode() {
        let t0 = Instant::now();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut o = orchestrator().with_relay(
            RelayPath::new(Box::new(Recorder(log.clone())), Duration::from_millis(200)).unwrap(),
        );
        o.handle_tc(&Tc::LinkStart, t0);
        o.step(t0);

        o.handle_tc(&Tc::Tap { x: 90.0, y: 5.0 }, t0);
        o.handle_tc(&Tc::Joystick { x: 0.0, y: 1.0 }, t0);
        assert_eq!(o.mode(), DriveMode::Manual);
        assert_eq!(o.target(), None);

        // Same stick re-sent through the throttle
        assert!(o.step(ms(t0, 50)).outcome.map_or(false, |s| s.is_sent()));
        wait_posted(&o, 1);
        assert_eq!(o.step(ms(t0, 60)).outcome, Some(SendOutcome::Throttled));

        // Centred inside the throttle window, the stop is forced
        o.handle_tc(&Tc::Centre, ms(t0, 70));
        assert!(o.step(ms(t0, 70)).outcome.map_or(false, |s| s.is_sent()));
        assert_eq!(o.step(ms(t0, 200)).outcome, None);

        assert_eq!(
            writes(&o),
            vec![
                "0.000,0.000,0,0".to_string(),
                "200.000,200.000,1,0".to_string(),
                "0.000,0.000,0,0".to_string(),
            ]
        );

        // Stick moved then centred, the neutral post is forced inside the throttle window
        o.relay_mut().unwrap().close();
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], ControlRecord::new(0.0, 1.0, false));
        assert!(log[1].is_neutral());

        // Tap goes back to servo mode
        drop(log);
        o.handle_tc(&Tc::Tap { x: 1.0, y: 1.0 }, ms(t0, 300));
        assert_eq!(o.mode(), DriveMode::Servo);
        assert_eq!(o.target(), Some(Point2::new(1.0, 1.0)));
    }
}
