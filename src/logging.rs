//! Log subscriber setup
//!
//! The library only emits `tracing` events. Binaries and tests that want to
//! see them call [`init`] once; `RUST_LOG` takes precedence over the filter
//! passed in.

use crate::config::RuntimeConfig;
use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber.
///
/// Fails if `filter` is not a valid directive or a global subscriber is
/// already installed.
pub fn init(filter: &str) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(env_filter) => env_filter,
        Err(_) => EnvFilter::try_new(filter)
            .with_context(|| format!("Invalid log filter '{}'", filter))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {}", e))
}

/// [`init`] with the filter from a runtime configuration
pub fn init_from_config(config: &RuntimeConfig) -> Result<()> {
    init(&config.log_filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        // the first call may lose the race with another test; the second never succeeds
        let _ = init("debug");
        assert!(init_from_config(&RuntimeConfig::default()).is_err());
    }
}
