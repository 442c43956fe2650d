//! # Rover command line
//!
//! Operator REPL for manual driving through the relay. Joystick, centre and honk commands are
//! posted to the relay's `/control` route, `logs` prints the relay's control log. Other
//! telecommands are printed as JSON, ready to be pasted into an event script.

use std::path::PathBuf;
use std::time::Duration;

use color_eyre::{eyre::WrapErr, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use structopt::StructOpt;

use comms_if::{
    net::{NetError, RelayClient},
    relay::ControlRecord,
    tc::Tc,
};

const PROMPT: &str = "rover $ ";

#[derive(Debug, StructOpt)]
#[structopt(name = "rover_cli", about = "Drive the rover through the control relay")]
struct Opts {
    /// Relay server address
    #[structopt(long, default_value = "127.0.0.1:5000")]
    endpoint: String,

    /// Timeout of a single request, in milliseconds
    #[structopt(long, default_value = "1000")]
    timeout_ms: u64,

    /// File the command history is kept in
    #[structopt(long, default_value = "data/history.txt", parse(from_os_str))]
    history: PathBuf,
}

/// What a line typed by the operator asks for.
#[derive(Debug, PartialEq)]
enum Action {
    Post(ControlRecord),
    Logs,
    Print(String),
    Help,
    Exit,
}

/// Tracks the stick so a honk keeps the current position.
#[derive(Debug, Default)]
struct Operator {
    stick: (f64, f64),
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let opts = Opts::from_args();
    let client = RelayClient::new(&opts.endpoint, Duration::from_millis(opts.timeout_ms));

    let mut rl = DefaultEditor::new().wrap_err("Could not start the line editor")?;
    if rl.load_history(&opts.history).is_err() {
        println!("No history detected");
    }

    println!("Relaying to {}, type \"help\" for the commands", client.base_url());

    let mut operator = Operator::default();

    loop {
        let line = match rl.readline(PROMPT) {
            Ok(l) => l,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e).wrap_err("Could not read the command line"),
        };

        if line.trim().is_empty() {
            continue;
        }
        rl.add_history_entry(line.as_str()).ok();

        match operator.parse(&line) {
            Ok(Action::Post(record)) => post(&client, &record),
            Ok(Action::Logs) => print_logs(&client),
            Ok(Action::Print(s)) => println!("{}", s),
            Ok(Action::Help) => print_help(),
            Ok(Action::Exit) => break,
            Err(e) => println!("{}", e),
        }
    }

    if let Err(e) = rl.save_history(&opts.history) {
        println!("Could not save history: {}", e);
    }

    println!("Exiting...");

    Ok(())
}

impl Operator {
    fn parse(&mut self, line: &str) -> Result<Action, String> {
        match line.trim() {
            "logs" => return Ok(Action::Logs),
            "help" => return Ok(Action::Help),
            "exit" | "quit" => return Ok(Action::Exit),
            _ => (),
        }

        let tc = Tc::from_words(line).map_err(|e| e.to_string())?;

        let record = match tc {
            Tc::Joystick { x, y } => {
                self.stick = (x, y);
                ControlRecord::new(x, y, false)
            }
            Tc::Centre => {
                self.stick = (0.0, 0.0);
                ControlRecord::new(0.0, 0.0, false)
            }
            Tc::Honk => ControlRecord::new(self.stick.0, self.stick.1, true),
            other => {
                return serde_json::to_string(&other)
                    .map(Action::Print)
                    .map_err(|e| e.to_string())
            }
        };

        record.validate().map_err(|e| e.to_string())?;

        Ok(Action::Post(record))
    }
}

fn post(client: &RelayClient, record: &ControlRecord) {
    match client.post_control(record) {
        Ok(_) => (),
        Err(NetError::Status(code, reason)) if reason.is_empty() => {
            println!("Relay rejected the control ({})", code)
        }
        Err(NetError::Status(code, reason)) => {
            println!("Relay rejected the control ({}): {}", code, reason)
        }
        Err(e) => println!("{}", e),
    }
}

fn print_logs(client: &RelayClient) {
    let entries = match client.logs() {
        Ok(e) => e,
        Err(e) => {
            println!("Could not get the logs: {}", e);
            return;
        }
    };

    if entries.is_empty() {
        println!("No controls logged");
    }

    for e in entries {
        println!("{}  x = {:+.2}  y = {:+.2}", e.time, e.x, e.y);
    }
}

fn print_help() {
    println!("Relayed:");
    println!("    joy <x> <y>     move the stick, both axes in [-1, 1]");
    println!("    centre          release the stick");
    println!("    honk            sound the horn");
    println!("    logs            show the relay's control log, newest first");
    println!("Printed as script JSON:");
    println!("    tap <x> <y>, clear, link-start, link-stop");
    println!("Other:");
    println!("    help, exit");
}
