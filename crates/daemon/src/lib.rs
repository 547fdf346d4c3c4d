//! Local TLS proxy that serves GitHub hosts through a mirror

pub mod app;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod proxy;
pub mod router;
pub mod server;

// Configuration exports
pub use config::{HostsSettings, ProxySettings, ServerSettings, Settings};

// Error exports
pub use error::{DaemonError, ListenError, Result, RouteError, ShutdownError};

// Request handling
pub use proxy::{ProxyBody, ProxyInstance, UpstreamClient, build_upstream_client};
pub use router::ProxyRouter;

// Server and lifecycle
pub use app::run;
pub use lifecycle::{ShutdownSignal, listen_for_signals, run_lifecycle};
pub use server::{ProxyServer, ServerHandle, load_tls_acceptor};
