//! Initialization functions for tracing

use crate::tracing::config::InstrumentationConfig;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Error returned when a global subscriber is already installed
pub type InitError = tracing_subscriber::util::TryInitError;

/// Initialize tracing with the given configuration
pub fn init_tracing(config: &InstrumentationConfig) -> Result<(), InitError> {
    tracing_subscriber::registry()
        .with(env_filter(&config.log_level))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(config.thread_info)
                .with_thread_names(config.thread_info),
        )
        .try_init()?;

    tracing::debug!(
        service = %config.service_name,
        version = %config.service_version,
        "Tracing initialized"
    );
    Ok(())
}

/// Build the filter, falling back to `info` when the directive is invalid
fn env_filter(directive: &str) -> EnvFilter {
    EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"))
}
