// src/logging.rs
//
// Global tracing subscriber setup.

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{ResizeServerError, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
///
/// Fails with `LoggingInit` when a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = build_env_filter(&config.level)?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(false).with_thread_ids(false))
            .try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(false).with_thread_ids(false))
            .try_init(),
    };

    installed.map_err(|err| {
        ResizeServerError::logging_init(format!("failed to install tracing subscriber: {err}"))
    })
}

fn build_env_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level).map_err(|err| {
        ResizeServerError::invalid_config("logging.level", level.to_string(), err.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_is_rejected() {
        let config = LoggingConfig::default();
        // the first call may already lose to another test in this binary
        let _ = init_logging(&config);
        assert!(matches!(
            init_logging(&config),
            Err(ResizeServerError::LoggingInit { .. })
        ));
    }
}
