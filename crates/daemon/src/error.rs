//! Error types for the proxy daemon

use github_proxy_core::HostsError;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for daemon operations
pub type Result<T> = std::result::Result<T, DaemonError>;

/// Top-level daemon errors; every variant is fatal at startup
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Settings could not be loaded or are invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    /// The hosts file could not be read, changed or saved
    #[error("Hosts override error: {0}")]
    OverrideStore(#[from] HostsError),

    /// The TLS server could not start
    #[error("Listen error: {0}")]
    Listen(#[from] ListenError),

    /// TLS client setup for the upstream failed
    #[error("Upstream client error: {0}")]
    UpstreamClient(#[source] rustls::Error),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The TLS server cannot bind or start
#[derive(Debug, Error)]
pub enum ListenError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load certificate {path}: {reason}")]
    Certificate { path: PathBuf, reason: String },

    #[error("failed to load private key {path}: {reason}")]
    PrivateKey { path: PathBuf, reason: String },

    #[error("invalid TLS configuration: {0}")]
    Tls(#[from] rustls::Error),
}

/// The computed upstream URL for a host cannot be used.
///
/// Local to a single request and answered with `400 Bad Request`.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("request has no host")]
    MissingHost,

    #[error("parse {url} error: {source}")]
    Parse {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("upstream {url} is not an http(s) url with a host")]
    Unsupported { url: String },

    #[error("upstream {url} cannot be forwarded to: {source}")]
    Rewrite {
        url: String,
        #[source]
        source: http::Error,
    },
}

/// Graceful shutdown did not finish cleanly
#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error("{active} connection(s) still open after {grace:?}")]
    Timeout { grace: Duration, active: usize },
}
