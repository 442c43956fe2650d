//! # Relay Executable
//!
//! This executable relays manual controls between operator clients and anything watching the
//! rover:
//! - `POST /control` records a joystick sample (and honk) in the control log
//! - `GET /logs` returns the most recent samples, newest first

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Log of received controls.
mod control_log;

/// Relay server abstraction.
mod relay_server;

/// Parameters for the relay executable.
mod params;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Result};
use log::{error, info};

// Internal
use control_log::ControlLog;
use params::RelayExecParams;
use relay_server::RelayServer;
use util::{
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of consecutive receive failures after which the server gives up.
const MAX_CONSEC_RECV_ERRORS: u64 = 10;

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new(
        "relay_exec",
        "sessions"
    ).wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session)
        .wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Control Relay Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    info!("Initialising...");

    // ---- LOAD PARAMETERS ----

    let params: RelayExecParams = util::params::load("relay_exec.toml")
        .wrap_err("Could not load relay params")?;

    info!("Parameters loaded");

    // ---- CONTROL LOG ----

    let log = match params.store_path {
        Some(ref path) => {
            let path = util::host::get_sw_root()
                .wrap_err("Could not find the software root")?
                .join(path);

            info!("Controls are stored in {:?}", path);

            ControlLog::open(&path, params.max_entries)
                .wrap_err("Failed to open the control store")?
        }
        None => {
            info!("No control store set, controls are kept in memory only");
            ControlLog::new(params.max_entries)
        }
    };

    // ---- SERVER INITIALISATION ----

    let mut server = RelayServer::new(&params, log)
        .wrap_err("Failed to initialise server")?;

    info!("Server listening on {:?}", server.local_addr());

    // ---- MAIN LOOP ----

    let mut num_consec_errors = 0;

    loop {
        match server.serve_one() {
            Ok(()) => num_consec_errors = 0,
            Err(e) => {
                error!("{}", e);
                num_consec_errors += 1;

                if num_consec_errors >= MAX_CONSEC_RECV_ERRORS {
                    return Err(e).wrap_err("The relay server could not receive requests");
                }
            }
        }
    }
}
