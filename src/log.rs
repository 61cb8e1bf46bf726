//! Initialisation and configuration of the program's logging system.
//!
//! Messages at `info` level and below go to stdout, warnings and errors go to stderr. When an
//! output folder is supplied, log messages are also written to plain-text files inside it.
use anyhow::{Result, bail};
use chrono::Local;
use fern::colors::{Color, ColoredLevelConfig};
use fern::{Dispatch, FormatCallback};
use log::{Level, LevelFilter};
use std::env;
use std::fmt::{Arguments, Display};
use std::fs::OpenOptions;
use std::io::IsTerminal;
use std::path::Path;
use std::sync::OnceLock;

/// The default log level for the program.
///
/// Used as a fallback if the user hasn't specified something else with the
/// `POWERDISPATCH_LOG_LEVEL` environment variable or the settings file.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// The environment variable which overrides the configured log level
pub const LOG_LEVEL_ENV_VAR: &str = "POWERDISPATCH_LOG_LEVEL";

/// The file name for the log file containing messages about general program operation
const LOG_INFO_FILE_NAME: &str = "powerdispatch_info.log";

/// The file name for the log file containing debug and trace messages
const LOG_DEBUG_FILE_NAME: &str = "powerdispatch_debug.log";

/// Set once the logger has been initialised
static LOGGER_INIT: OnceLock<()> = OnceLock::new();

/// Whether the program logger has been initialised
pub fn is_logger_initialised() -> bool {
    LOGGER_INIT.get().is_some()
}

/// Parse a log level string (case insensitive)
pub(crate) fn parse_log_level(level: &str) -> Result<LevelFilter> {
    let filter = match level.to_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        unknown => bail!("Unknown log level: {unknown}"),
    };

    Ok(filter)
}

/// Initialise the program logger using the `fern` logging library.
///
/// The log level is taken from the `POWERDISPATCH_LOG_LEVEL` environment variable if set,
/// otherwise from `log_level_from_settings`.
///
/// # Arguments
///
/// * `log_level_from_settings` - The log level specified in the program settings
/// * `log_file_path` - Folder in which to save log files. If `None`, no log files are written.
pub fn init(log_level_from_settings: &str, log_file_path: Option<&Path>) -> Result<()> {
    let log_level = env::var(LOG_LEVEL_ENV_VAR).unwrap_or_else(|_| log_level_from_settings.into());
    let log_level = parse_log_level(&log_level)?;

    let colours = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Blue)
        .trace(Color::Magenta);
    let use_colour_stdout = std::io::stdout().is_terminal();
    let use_colour_stderr = std::io::stderr().is_terminal();

    let mut dispatch = Dispatch::new()
        .chain(
            Dispatch::new()
                .filter(|metadata| metadata.level() > Level::Warn)
                .format(move |out, message, record| {
                    if use_colour_stdout {
                        write_log(out, colours.color(record.level()), record.target(), message);
                    } else {
                        write_log(out, record.level(), record.target(), message);
                    }
                })
                .level(log_level)
                .chain(std::io::stdout()),
        )
        .chain(
            Dispatch::new()
                .format(move |out, message, record| {
                    if use_colour_stderr {
                        write_log(out, colours.color(record.level()), record.target(), message);
                    } else {
                        write_log(out, record.level(), record.target(), message);
                    }
                })
                .level(log_level.min(LevelFilter::Warn))
                .chain(std::io::stderr()),
        );

    if let Some(log_file_path) = log_file_path {
        let info_log_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(log_file_path.join(LOG_INFO_FILE_NAME))?;
        let debug_log_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(log_file_path.join(LOG_DEBUG_FILE_NAME))?;

        dispatch = dispatch
            .chain(
                Dispatch::new()
                    .format(|out, message, record| {
                        write_log(out, record.level(), record.target(), message);
                    })
                    .level(log_level.min(LevelFilter::Info))
                    .chain(info_log_file),
            )
            .chain(
                Dispatch::new()
                    .filter(|metadata| metadata.level() > Level::Info)
                    .format(|out, message, record| {
                        write_log(out, record.level(), record.target(), message);
                    })
                    .level(log_level)
                    .chain(debug_log_file),
            );
    }

    dispatch.apply()?;
    LOGGER_INIT.get_or_init(|| ());

    Ok(())
}

/// Write a log message to the specified output
fn write_log<T: Display>(out: FormatCallback, level: T, target: &str, message: &Arguments) {
    let timestamp = Local::now().format("%H:%M:%S");

    out.finish(format_args!("[{timestamp} {level} {target}] {message}"));
}
