//! Tracing subscriber setup.
//!
//! The runtime itself only emits `tracing` events; the embedding process
//! decides whether and how to collect them. [`init_from_config`] installs a
//! global `fmt` subscriber filtered at the configured level, which `RUST_LOG`
//! overrides when set.

use anyhow::{anyhow, Context};
use tracing_subscriber::EnvFilter;

use crate::config::IspConfig;

/// Build the filter for `config`, preferring `RUST_LOG` when present.
///
/// # Errors
///
/// Fails if the configured level is not a valid filter directive.
pub fn env_filter(config: &IspConfig) -> anyhow::Result<EnvFilter> {
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        return Ok(EnvFilter::from_default_env());
    }
    EnvFilter::try_new(&config.logging.level)
        .with_context(|| format!("invalid log level '{}'", config.logging.level))
}

/// Install the global subscriber described by `config.logging`.
///
/// # Errors
///
/// Fails if the filter is invalid or a global subscriber is already set.
pub fn init_from_config(config: &IspConfig) -> anyhow::Result<()> {
    let filter = env_filter(config)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_target(true);

    if config.logging.json {
        builder
            .json()
            .try_init()
            .map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))
    } else {
        builder
            .try_init()
            .map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_filter_from_config_level() {
        std::env::remove_var(EnvFilter::DEFAULT_ENV);
        let mut config = IspConfig::default();
        config.logging.level = "debug".into();
        let filter = env_filter(&config).unwrap();
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    #[serial]
    fn test_rust_log_overrides_config() {
        std::env::set_var(EnvFilter::DEFAULT_ENV, "warn");
        let filter = env_filter(&IspConfig::default());
        std::env::remove_var(EnvFilter::DEFAULT_ENV);
        assert_eq!(filter.unwrap().to_string(), "warn");
    }
}
