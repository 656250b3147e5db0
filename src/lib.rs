pub mod app;
pub mod cli;
pub mod config;
pub mod sampler;
pub mod snapshot;
pub mod source;
pub mod store;

use std::fmt;

pub use app::periodic::{start_periodic_export, start_periodic_sampling, SamplingHandle};
pub use sampler::{Sampler, SamplingError};
pub use snapshot::{Counter, CounterClass, CounterSet, MetricsSnapshot};
pub use store::SnapshotStore;

/// Crate-wide error type.
#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    InvalidArgs(String),
    Parse(String),
    Sampling(SamplingError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "io error: {err}"),
            Error::InvalidArgs(msg) => write!(f, "invalid arguments: {msg}"),
            Error::Parse(msg) => write!(f, "parse error: {msg}"),
            Error::Sampling(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Sampling(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<SamplingError> for Error {
    fn from(err: SamplingError) -> Self {
        Error::Sampling(err)
    }
}
