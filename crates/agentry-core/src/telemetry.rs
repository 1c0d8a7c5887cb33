//! Tracing subscriber setup for binaries and services embedding the engine

use tracing_subscriber::EnvFilter;

use crate::{Error, Result};

/// Install a fmt subscriber filtered by `RUST_LOG` plus `default_directive`
///
/// Fails if the directive does not parse or a global subscriber is
/// already installed.
pub fn init_tracing(default_directive: &str) -> Result<()> {
    let directive = default_directive
        .parse()
        .map_err(|e| Error::Config(format!("invalid log directive '{}': {}", default_directive, e)))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive))
        .try_init()
        .map_err(|e| Error::Other(format!("tracing already initialised: {}", e)))
}
