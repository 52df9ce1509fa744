//! # CLI Module
//!
//! Command-line front end for probing devices and driving the route manager.

mod app;
mod commands;
pub mod output;

pub use app::{exit_with_error, run};

use crate::config::ConfigError;
use crate::error::{DeviceError, RouteError};
use std::fmt;
use std::io;

#[derive(Debug)]
pub enum CliError {
    Config(ConfigError),
    Device(DeviceError),
    Route(RouteError),
    Io(io::Error),
    Usage(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(e) => write!(f, "{}", e),
            CliError::Device(e) => write!(f, "{}", e),
            CliError::Route(e) => write!(f, "{}", e),
            CliError::Io(e) => write!(f, "{}", e),
            CliError::Usage(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl From<DeviceError> for CliError {
    fn from(e: DeviceError) -> Self {
        CliError::Device(e)
    }
}

impl From<RouteError> for CliError {
    fn from(e: RouteError) -> Self {
        CliError::Route(e)
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        CliError::Io(e)
    }
}

pub type CliResult<T> = std::result::Result<T, CliError>;

/// Initialize `env_logger`. `--verbose` wins over the configured level.
pub(crate) fn setup_logging(verbose: bool, level: Option<&str>) {
    if verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug"))
            .format_timestamp_millis()
            .init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level.unwrap_or("warn")))
            .format_target(false)
            .format_timestamp(None)
            .init();
    }
}
