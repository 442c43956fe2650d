//! # Rover script interpreter module
//!
//! This module provides an interpreter for rover scripts, allowing operator
//! telecommands and simulated vision frames to be replayed at set times.
//!
//! A script is a list of `<time_s>: <json>;` lines, where the JSON is a
//! [`ScriptEvent`]:
//!
//! ```text
//! 0.5: {"tc": {"type": "LINK_START"}};
//! 1.0: {"frame": {"pose": null, "frame_size": {"width": 640, "height": 480}}};
//! ```

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::fs;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Internal
use comms_if::{eqpt::vision::FrameSample, tc::Tc};
use crate::session::get_elapsed_seconds;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An event which is scripted to occur at a specific time.
#[derive(Debug, Clone)]
struct Command {
    /// The time the event is supposed to execute at
    exec_time_s: f64,

    /// The event to run
    event: ScriptEvent
}

/// A script interpreter.
///
/// After initialising with the path to the script to run use `.get_pending`
/// to acquire a list of events that need executing.
pub struct ScriptInterpreter {
    script_path: PathBuf,
    cmds: VecDeque<Command>
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A single scripted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptEvent {
    /// An operator telecommand
    Tc(Tc),

    /// The result of analysing one camera frame
    Frame(FrameSample)
}

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Could not find the script at {0:?}")]
    ScriptNotFound(PathBuf),

    #[error("Could not load the script: {0}")]
    ScriptLoadError(std::io::Error),

    #[error("Could not build the script regex: {0}")]
    RegexError(regex::Error),

    #[error("The script is empty (or is so bad it can't be read)")]
    ScriptEmpty,

    #[error(
        "Script contains an invalid timestamp: {0}. \
        Should be a float (like 1.0)")]
    InvalidTimestamp(String),

    #[error("Script contains an invalid event at {0} s: {1}")]
    InvalidEvent(f64, serde_json::Error)
}

#[derive(Debug, PartialEq)]
pub enum PendingEvents {
    None,
    Some(Vec<ScriptEvent>),
    EndOfScript
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ScriptInterpreter {

    /// Create a new interpreter from the given script path.
    pub fn new<P: AsRef<Path>>(script_path: P) -> Result<Self, ScriptError> {

        // Get the path in a buffer
        let path = PathBuf::from(script_path.as_ref());

        // Check that the script file exists.
        if !path.exists() {
            return Err(ScriptError::ScriptNotFound(path));
        }

        // Load the script into a string
        let script = fs::read_to_string(&path)
            .map_err(ScriptError::ScriptLoadError)?;

        let mut interp = Self::from_script(&script)?;
        interp.script_path = path;

        Ok(interp)
    }

    /// Create a new interpreter from the script text itself.
    pub fn from_script(script: &str) -> Result<Self, ScriptError> {

        // Empty queue of commands
        let mut cmds: VecDeque<Command> = VecDeque::new();

        // Go through the script executing __the magic regex__.
        let re = RegexBuilder::
            new(r"^\s*(\d+(\.\d+)?)\s*:\s*([^;]*);")
            .multi_line(true)
            .build()
            .map_err(ScriptError::RegexError)?;

        for cap in re.captures_iter(script) {
            let time_str = cap.get(1).map(|m| m.as_str()).unwrap_or("");
            let payload = cap.get(3).map(|m| m.as_str()).unwrap_or("");

            // Parse the exec time
            let exec_time_s: f64 = time_str.parse()
                .map_err(|e| ScriptError::InvalidTimestamp(format!("{}", e)))?;

            // The scripts contain JSON only.
            let event: ScriptEvent = serde_json::from_str(payload)
                .map_err(|e| ScriptError::InvalidEvent(exec_time_s, e))?;

            cmds.push_back(Command {
                exec_time_s,
                event
            });
        }

        if cmds.is_empty() {
            return Err(ScriptError::ScriptEmpty)
        }

        // Events are executed in time order, a stable sort keeps same-time
        // events in script order.
        let mut sorted: Vec<Command> = cmds.into_iter().collect();
        sorted.sort_by(|a, b| a.exec_time_s
            .partial_cmp(&b.exec_time_s)
            .unwrap_or(std::cmp::Ordering::Equal));

        Ok(ScriptInterpreter {
            script_path: PathBuf::new(),
            cmds: sorted.into()
        })
    }

    /// Return the events which are due at the current session time.
    pub fn get_pending(&mut self) -> PendingEvents {
        self.get_pending_at(get_elapsed_seconds())
    }

    /// Return the events which are due at the given script time.
    pub fn get_pending_at(&mut self, current_time_s: f64) -> PendingEvents {

        // If the queue is empty the script is over and we return the end of
        // script variant
        if self.cmds.is_empty() {
            return PendingEvents::EndOfScript
        }

        let mut events: Vec<ScriptEvent> = vec![];

        // Keep popping from the head while its exec time has passed.
        while let Some(c) = self.cmds.front() {
            if c.exec_time_s > current_time_s {
                break;
            }
            if let Some(c) = self.cmds.pop_front() {
                events.push(c.event);
            }
        }

        if events.is_empty() {
            PendingEvents::None
        }
        else {
            PendingEvents::Some(events)
        }
    }

    /// Get the number of events remaining in the script
    pub fn get_num_events(&self) -> usize {
        self.cmds.len()
    }

    /// Get the length of the script in seconds
    pub fn get_duration(&self) -> f64 {
        match self.cmds.back() {
            Some(c) => c.exec_time_s,
            None => 0f64
        }
    }

    /// Path of the loaded script, empty if built from text.
    pub fn script_path(&self) -> &Path {
        &self.script_path
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
