//! Logging setup for binaries built on the driver.
//!
//! The library itself only emits `tracing` events; installing a subscriber
//! is left to the process that embeds it.

use crate::Result;
use tracing_subscriber::EnvFilter;

/// Maps CLI verbosity flags to a default log level.
fn level_for(verbose: u8, quiet: bool) -> tracing::Level {
    match (quiet, verbose) {
        (true, _) => tracing::Level::ERROR,
        (false, 0) => tracing::Level::INFO,
        (false, 1) => tracing::Level::DEBUG,
        (false, _) => tracing::Level::TRACE,
    }
}

/// Initializes structured logging based on verbosity level.
///
/// `RUST_LOG`, when set, takes precedence over the verbosity flags.
///
/// # Arguments
/// * `verbose` - Verbosity level (0=INFO, 1=DEBUG, 2+=TRACE)
/// * `quiet` - If true, only show ERROR level logs
///
/// # Example
/// ```rust,no_run
/// use atlasdriver_core::logging::init_logging;
///
/// init_logging(1, false).expect("Failed to initialize logging");
/// ```
pub fn init_logging(verbose: u8, quiet: bool) -> Result<()> {
    let level = level_for(verbose, quiet);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| {
            crate::error::AtlasDriverError::configuration(format!(
                "Failed to initialize logging: {}",
                e
            ))
        })?;

    Ok(())
}
