//! Tracing subscriber setup.

use anyhow::{Context, Result};
use callwire_settings::LoggingSettings;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Build the filter: `RUST_LOG` wins, otherwise the configured level.
pub fn env_filter(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level)
            .with_context(|| format!("invalid log level directive: {level:?}")),
    }
}

/// Install the global subscriber. JSON lines when `logging.json` is set.
pub fn init(logging: &LoggingSettings) -> Result<()> {
    let filter = env_filter(&logging.level)?;
    let fmt = if logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).boxed()
    };

    tracing_subscriber::registry()
        .with(fmt)
        .with(filter)
        .try_init()
        .context("installing tracing subscriber")
}
