//! Configuration for tracing
//!
//! This module provides the configuration type consumed by
//! [`init_tracing`](crate::tracing::init::init_tracing).

use serde::{Deserialize, Serialize};

/// Main instrumentation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentationConfig {
    /// Service name reported in the startup line
    pub service_name: String,
    /// Service version
    pub service_version: String,
    /// Log level filter (e.g., "info", "debug", "github_proxy_daemon=trace")
    pub log_level: String,
    /// Include thread ids and names in every line
    #[serde(default)]
    pub thread_info: bool,
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            service_name: "github-proxy".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "info".to_string(),
            thread_info: false,
        }
    }
}

impl InstrumentationConfig {
    /// Create a development configuration with verbose output
    pub fn dev() -> Self {
        Self {
            service_name: "github-proxy-dev".to_string(),
            service_version: "dev".to_string(),
            log_level: "debug".to_string(),
            thread_info: true,
        }
    }

    /// Use `log_level` unless `RUST_LOG` is set
    pub fn with_log_level(mut self, log_level: impl Into<String>) -> Self {
        self.log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into());
        self
    }
}
