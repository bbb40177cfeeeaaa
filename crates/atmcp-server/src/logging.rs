//! Logging initialization
//!
//! Logs go to stderr only: stdout carries the MCP protocol stream.
//! `RUST_LOG` overrides the configured level.

use std::io;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::LoggingSettings;

/// Install the global subscriber
///
/// # Errors
///
/// Returns an error if the filter directive is invalid or a subscriber is
/// already installed.
pub fn init(settings: &LoggingSettings) -> io::Result<()> {
    let filter = filter(settings)?;
    let subscriber = tracing_subscriber::registry().with(filter);

    if settings.json {
        subscriber
            .with(fmt::layer().json().with_writer(io::stderr))
            .try_init()
            .map_err(|e| io::Error::other(e.to_string()))
    } else {
        subscriber
            .with(fmt::layer().with_ansi(false).with_writer(io::stderr))
            .try_init()
            .map_err(|e| io::Error::other(e.to_string()))
    }
}

fn filter(settings: &LoggingSettings) -> io::Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&settings.level)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string())),
    }
}
