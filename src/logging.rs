//! Logging setup for applications embedding the receiver core
//!
//! The library itself only emits `tracing` events; installing a subscriber is
//! left to the application. [`init`] is a convenience for the common case.

use tracing_subscriber::EnvFilter;

/// Logging configuration error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),

    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),
}

/// Install a global fmt subscriber
///
/// `filter` uses `EnvFilter` syntax (e.g. `"yamaha_avr=debug"`). When `None`,
/// the `RUST_LOG` environment variable is used, falling back to `info`.
pub fn init(filter: Option<&str>) -> Result<(), LoggingError> {
    let filter = match filter {
        Some(directives) => EnvFilter::try_new(directives)
            .map_err(|e| LoggingError::InvalidFilter(e.to_string()))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| LoggingError::TracingInit(e.to_string()))
}
