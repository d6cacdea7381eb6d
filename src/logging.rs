//! Structured logging setup.
//!
//! Logs go to stderr through `tracing-subscriber`. `RUST_LOG`, when set,
//! takes precedence over `[logging] filter`; `[logging] format` picks
//! human-readable (`pretty`) or line-delimited JSON output.

use anyhow::Result;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Build the filter: `RUST_LOG` first, then the configured directive.
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.filter)
            .map_err(|e| anyhow::anyhow!("Invalid logging.filter '{}': {}", config.filter, e)),
    }
}

/// Install the global subscriber. Call once, before any work starts.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = env_filter(config)?;

    if config.is_json() {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_current_span(true),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(atty::is(atty::Stream::Stderr))
                    .with_target(false),
            )
            .try_init()?;
    }

    tracing::debug!(format = %config.format, "logging initialised");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_filter_is_parsed() {
        let config = LoggingConfig {
            format: "pretty".to_string(),
            filter: "info,labcheck=debug".to_string(),
        };
        assert!(env_filter(&config).is_ok());
    }
}
