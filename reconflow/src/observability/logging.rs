//! Subscriber setup for the `tracing` events emitted by the kernel.
//!
//! The kernel itself only emits events; installing a subscriber is the job of
//! the controller binary, which can call [`init_tracing`] once at startup.

use crate::config::{LogConfig, LogFormat};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, EnvFilter};

/// Builds the filter: `RUST_LOG` wins, the configured directives are the fallback.
#[must_use]
pub fn env_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter))
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(config: &LogConfig) -> Result<(), TryInitError> {
    let (text, json) = match config.format {
        LogFormat::Text => (Some(fmt::layer().with_target(config.with_target)), None),
        LogFormat::Json => (
            None,
            Some(fmt::layer().json().with_target(config.with_target)),
        ),
    };

    tracing_subscriber::registry()
        .with(text)
        .with(json)
        .with(env_filter(config))
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_falls_back_to_config() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = LogConfig {
            filter: "reconflow=trace".to_string(),
            ..LogConfig::default()
        };
        assert_eq!(env_filter(&config).to_string(), "reconflow=trace");
    }

    #[test]
    fn test_second_init_fails() {
        let config = LogConfig::default();
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}
