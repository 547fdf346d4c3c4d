//! Error types for the hosts override store

use crate::hosts::OverrideState;
use std::path::PathBuf;

/// Result type for hosts store operations
pub type HostsResult<T> = std::result::Result<T, HostsError>;

/// Errors raised while reading, changing or persisting the hosts file
#[derive(Debug, thiserror::Error)]
pub enum HostsError {
    /// The hosts file could not be read
    #[error("failed to open hosts file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The hosts file could not be written back
    #[error("failed to save hosts file {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A hostname cannot be written as a hosts entry
    #[error("invalid hostname {0:?}")]
    InvalidHostname(String),

    /// The override lifecycle was driven out of order
    #[error("cannot {action} host overrides while {state}")]
    InvalidTransition {
        action: &'static str,
        state: OverrideState,
    },

    /// Failure reported by a non-file store
    #[error("hosts store error: {0}")]
    Store(String),
}

impl HostsError {
    /// Create a store error from any message
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }
}
