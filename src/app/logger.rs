use crate::{Error, Result};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*};

pub const LOG_PATH_ENV: &str = "GCPULSE_LOG_PATH";

pub fn parse_level(raw: &str) -> Result<LevelFilter> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "error" => Ok(LevelFilter::ERROR),
        "warn" => Ok(LevelFilter::WARN),
        "info" => Ok(LevelFilter::INFO),
        "debug" => Ok(LevelFilter::DEBUG),
        "trace" => Ok(LevelFilter::TRACE),
        other => Err(Error::InvalidArgs(format!(
            "log level must be one of error|warn|info|debug|trace, got '{other}'"
        ))),
    }
}

/// Install the global subscriber: stderr, plus an append-only file when a log
/// path is given (or set via `GCPULSE_LOG_PATH`).
///
/// Returns false when a subscriber was already installed.
pub fn init_logging(level: &str, log_file: Option<&str>) -> Result<bool> {
    let level = parse_level(level)?;
    let path = log_file
        .map(str::to_string)
        .or_else(|| std::env::var(LOG_PATH_ENV).ok());

    let stderr = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(level);

    let file = match path {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(level),
            )
        }
        None => None,
    };

    Ok(tracing_subscriber::registry()
        .with(stderr)
        .with(file)
        .try_init()
        .is_ok())
}
