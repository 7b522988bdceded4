//! Logging setup
//!
//! The library only emits `tracing` events. Binaries and tests that want to
//! see them call [`init_logging`] once at startup.

use crate::error::{ShortenerError, ShortenerResult};
use tracing_subscriber::EnvFilter;

/// Directive used when `RUST_LOG` is unset
pub const DEFAULT_LOG_DIRECTIVE: &str = "shortener_lib=info";

/// Install a global fmt subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive`
///
/// # Errors
/// Returns `ConfigError` if the directive is invalid or a global subscriber
/// is already installed.
pub fn init_logging(default_directive: &str) -> ShortenerResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive).map_err(|e| {
            ShortenerError::ConfigError(format!(
                "invalid log directive '{}': {}",
                default_directive, e
            ))
        })?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| ShortenerError::ConfigError(format!("logger already initialized: {}", e)))
}
