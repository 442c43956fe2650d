//! Main drive-side executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise all modules
//!     - Start the drive link
//!     - Main loop:
//!         - Script event processing (telecommands and analysed frames)
//!         - Orchestrator step:
//!             - Link event and timer processing
//!             - Visual servo control or joystick mixing
//!             - Throttled command dispatch
//!         - Simulated drive peer processing
//!     - Force a final stop, stop the link and save the session summary
//!
//! The drive peer is simulated, so the whole chain from operator input to the wheel demands seen
//! by the firmware can be exercised from a script.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{debug, info, warn};
use serde::Serialize;
use std::env;
use std::thread;
use std::time::{Duration, Instant};

// Internal
use drive_lib::{
    cmd_channel::CommandChannel,
    joystick::{JoystickMixer, JoystickParams},
    link::{
        sim::{SimPeer, SimPeerConfig, SimTransport},
        LinkMgr, LinkParams, LinkStatus, Transition,
    },
    orchestrator::Orchestrator,
    params::DriveExecParams,
    relay_client::{HttpRelayClient, RelayPath},
    servo_ctrl::ServoCtrl,
};
use util::{
    logger::{logger_init, LevelFilter},
    module::State,
    script_interpreter::{PendingEvents, ScriptEvent, ScriptInterpreter},
    session::Session,
};

// ---------------------------------------------------------------------------
// STRUCTURES
// ---------------------------------------------------------------------------

/// Summary of the execution, saved in the session directory on exit.
#[derive(Debug, Default, Serialize)]
struct ExecSummary {
    num_cycles: u64,
    num_cycle_overruns: u64,
    num_sent: u64,
    num_throttled: u64,
    num_write_failures: u64,
    num_relayed: u64,
    num_relay_failures: u64,
    num_relay_dropped: u64,
    peer_num_rx: u64,
    peer_num_rejected: u64,
    peer_num_honks: u64,
    peer_num_watchdog_stops: u64,
    link: LinkStatus,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("drive_exec", "sessions")
        .wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Rover Drive Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let exec_params: DriveExecParams =
        util::params::load("drive_exec.toml").wrap_err("Could not load exec params")?;
    let link_params: LinkParams =
        util::params::load("link.toml").wrap_err("Could not load link params")?;
    let joystick_params: JoystickParams =
        util::params::load("joystick.toml").wrap_err("Could not load joystick params")?;

    if !(exec_params.cycle_period_s > 0.0) {
        return Err(eyre!(
            "The cycle period must be positive, found {}",
            exec_params.cycle_period_s
        ));
    }

    info!("Exec parameters loaded");

    // ---- INITIALISE SCRIPT ----

    // Collect all arguments
    let args: Vec<String> = env::args().collect();

    debug!("CLI arguments: {:?}", args);

    if args.len() != 2 {
        return Err(eyre!(
            "Expected the path to an event script as the only argument, found {} arguments",
            args.len() - 1
        ));
    }

    info!("Loading script from \"{}\"", &args[1]);

    let mut script = ScriptInterpreter::new(&args[1]).wrap_err("Failed to load script")?;

    info!(
        "Loaded script lasts {:.02} s and contains {} events\n",
        script.get_duration(),
        script.get_num_events()
    );

    // ---- INITIALISE MODULES ----

    info!("Initialising modules...");

    let mut servo_ctrl = ServoCtrl::default();
    servo_ctrl
        .init("servo_ctrl.toml", &session)
        .wrap_err("Failed to initialise ServoCtrl")?;
    info!("ServoCtrl init complete");

    let transport = SimTransport::new(SimPeerConfig::drive_peer(&link_params));
    let mut peer = SimPeer::new();
    info!(
        "Simulated drive peer \"{}\" advertising {}",
        link_params.device_name, link_params.service_uuid
    );

    let mut orch = Orchestrator::new(
        LinkMgr::new(link_params, transport),
        CommandChannel::new(exec_params.device_interval()),
        servo_ctrl,
        JoystickMixer::new(joystick_params),
        exec_params.output_size,
    );

    if let Some(ref endpoint) = exec_params.relay_endpoint {
        info!("Manual controls will be relayed to {}", endpoint);
        let relay = RelayPath::new(
            Box::new(HttpRelayClient::new(endpoint, exec_params.relay_timeout())),
            exec_params.relay_interval(),
        )
        .wrap_err("Failed to start the relay path")?;
        orch = orch.with_relay(relay);
    }

    info!("Module initialisation complete\n");

    // ---- START LINK ----

    log_transitions(&orch.start(Instant::now()));

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    let cycle_period = Duration::from_secs_f64(exec_params.cycle_period_s);
    let mut summary = ExecSummary::default();

    loop {
        // Get cycle start time
        let cycle_start_instant = Instant::now();

        // ---- SCRIPT PROCESSING ----

        match script.get_pending() {
            PendingEvents::None => (),
            PendingEvents::Some(events) => {
                for event in events {
                    match event {
                        ScriptEvent::Tc(tc) => {
                            log_transitions(&orch.handle_tc(&tc, cycle_start_instant))
                        }
                        ScriptEvent::Frame(sample) => orch.submit_frame(sample),
                    }
                }
            }
            // Exit if end of script reached
            PendingEvents::EndOfScript => {
                info!("End of event script reached, stopping");
                break;
            }
        }

        // ---- ORCHESTRATOR ----

        let report = orch.step(cycle_start_instant);
        log_transitions(&report.transitions);

        if let Some(ref servo) = report.servo {
            debug!(
                "ServoCtrl: e = {:.3} rad, d = {:.1}, v = {:.2}, w = {:.3}{}",
                servo.heading_err_rad,
                servo.dist,
                servo.speed,
                servo.turn_rate,
                if servo.gated { " (gated)" } else { "" }
            );
        }

        // ---- SIMULATED PEER ----

        deliver_to_peer(&mut orch, &mut peer, cycle_start_instant);

        if peer.tick(cycle_start_instant) {
            summary.peer_num_watchdog_stops += 1;
        }

        // ---- CYCLE MANAGEMENT ----

        let cycle_dur = Instant::now() - cycle_start_instant;

        // Get sleep duration
        match cycle_period.checked_sub(cycle_dur) {
            Some(d) => thread::sleep(d),
            None => {
                warn!(
                    "Cycle overran by {:.06} s",
                    cycle_dur.as_secs_f64() - cycle_period.as_secs_f64()
                );
                summary.num_cycle_overruns += 1;
            }
        }

        // Increment cycle counter
        summary.num_cycles += 1;
    }

    // ---- SHUTDOWN ----

    let stop_instant = Instant::now();
    log_transitions(&orch.stop(stop_instant));
    deliver_to_peer(&mut orch, &mut peer, stop_instant);

    if peer.is_moving() {
        warn!("The drive peer is still moving after the final stop");
    }

    // Wait for the relay worker to finish what it holds
    if let Some(relay) = orch.relay_mut() {
        relay.close();
    }

    summary.num_sent = orch.channel().num_sent();
    summary.num_throttled = orch.channel().num_throttled();
    summary.num_write_failures = orch.channel().num_failed();
    if let Some(relay) = orch.relay() {
        summary.num_relayed = relay.num_posted();
        summary.num_relay_failures = relay.num_failed();
        summary.num_relay_dropped = relay.num_dropped();
    }
    summary.peer_num_rx = peer.num_rx();
    summary.peer_num_rejected = peer.num_rejected();
    summary.peer_num_honks = peer.num_honks();
    summary.link = orch.link().status().clone();

    info!(
        "Sent {} commands ({} throttled), peer accepted {}",
        summary.num_sent, summary.num_throttled, summary.peer_num_rx
    );

    session
        .save_json("summary.json", &summary)
        .wrap_err("Failed to save the execution summary")?;

    info!("End of execution");

    Ok(())
}

/// Hand everything written to the simulated link to the drive peer.
fn deliver_to_peer(orch: &mut Orchestrator<SimTransport>, peer: &mut SimPeer, now: Instant) {
    for payload in orch.link_mut().transport_mut().take_writes() {
        match peer.receive(&payload, now) {
            Ok(dems) => debug!("Peer demands: {:?}", dems),
            Err(e) => warn!("Peer could not parse the command: {}", e),
        }
    }
}

fn log_transitions(transitions: &[Transition]) {
    for t in transitions {
        info!("Link: {:?} -> {:?}", t.from, t.to);
    }
}
