//! Logging setup for the executables.
//!
//! Records go to the terminal with coloured level tags and to the session's log file as plain
//! text. Every line is prefixed with the seconds elapsed since the session started.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use colored::{ColoredString, Colorize};
use log::{info, Level, Record};
use std::fmt::Arguments;
use thiserror::Error;

// Internal imports
use crate::session;

// Re-exports
pub use log::LevelFilter;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Environment variable overriding the level passed to [`logger_init`].
pub const LOG_LEVEL_ENV: &str = "ROVER_LOG_LEVEL";

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors associated with initialising the logger.
#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("Expected a log level of at least `INFO`, found `{0}`")]
    InvalidMinLogLevel(LevelFilter),

    #[error("Invalid log level in ROVER_LOG_LEVEL: {0:?}")]
    InvalidEnvLevel(String),

    #[error("Error initialising the log file: {0}")]
    LogFileInitError(std::io::Error),

    #[error("An error occured while setting up the logger: {0}")]
    FernInitError(log::SetLoggerError)
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Initialise the logger for this execution.
///
/// `min_level` is used unless `ROVER_LOG_LEVEL` is set. The level must let `INFO` records through.
///
/// Must only be called once per process.
pub fn logger_init(
    min_level: LevelFilter,
    session: &session::Session
) -> Result<(), LoggerInitError> {

    let level = match std::env::var(LOG_LEVEL_ENV) {
        Ok(s) => parse_level(&s)?,
        Err(_) => min_level,
    };

    if level < Level::Info {
        return Err(LoggerInitError::InvalidMinLogLevel(level))
    }

    let terminal = fern::Dispatch::new()
        .format(|out, message, record| {
            write_line(out, message, record, level_tag(record.level()))
        })
        .chain(std::io::stdout());

    let file = fern::Dispatch::new()
        .format(|out, message, record| {
            write_line(out, message, record, level_tag(record.level()).clear())
        })
        .chain(
            fern::log_file(&session.log_file_path)
                .map_err(LoggerInitError::LogFileInitError)?
        );

    fern::Dispatch::new()
        .level(level)
        .level_for("rustyline", LevelFilter::Warn)
        .chain(terminal)
        .chain(file)
        .apply()
        .map_err(LoggerInitError::FernInitError)?;

    info!("Logging initialised");
    if let Ok(epoch) = session::get_epoch() {
        info!("    Session epoch: {}", epoch);
    }
    info!("    Log level: {:?}", level);
    info!("    Log file path: {:?}", session.log_file_path);

    Ok(())
}

/// Parse a level name such as `debug` or `INFO`.
pub fn parse_level(s: &str) -> Result<LevelFilter, LoggerInitError> {
    s.trim()
        .parse()
        .map_err(|_| LoggerInitError::InvalidEnvLevel(s.to_string()))
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn write_line(
    out: fern::FormatCallback,
    message: &Arguments,
    record: &Record,
    tag: ColoredString
) {
    // Debug and trace lines name the module they came from
    if record.level() > Level::Info {
        out.finish(format_args!(
            "[{:10.6} {}] {}: {}",
            session::get_elapsed_seconds(),
            tag,
            record.target(),
            message
        ))
    }
    else {
        out.finish(format_args!(
            "[{:10.6} {}] {}",
            session::get_elapsed_seconds(),
            tag,
            message
        ))
    }
}

fn level_tag(level: Level) -> ColoredString {
    match level {
        Level::Trace => "TRC".dimmed().italic(),
        Level::Debug => "DBG".dimmed(),
        Level::Info  => "INF".normal(),
        Level::Warn  => "WRN".yellow(),
        Level::Error => "ERR".red().bold()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug").unwrap(), LevelFilter::Debug);
        assert_eq!(parse_level(" TRACE ").unwrap(), LevelFilter::Trace);
        assert!(parse_level("loud").is_err());
    }
}
