//! Startup sequence from validated settings to a finished teardown

use crate::config::Settings;
use crate::error::{DaemonError, Result};
use crate::lifecycle::{ShutdownSignal, run_lifecycle};
use crate::proxy::build_upstream_client;
use crate::router::ProxyRouter;
use crate::server::{ProxyServer, load_tls_acceptor};
use github_proxy_core::{HostOverrides, HostsStore};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Serve until the first signal arrives on `signals`, then tear down.
///
/// The listener is bound before `store` is touched, so a listen failure
/// leaves the hosts untouched. A failed install returns before anything is
/// served. On return after a signal the overrides have been reverted.
///
/// # Errors
///
/// Returns an error if the upstream client, TLS material, listener or the
/// initial hosts install fails
pub async fn run<S: HostsStore>(
    settings: Settings,
    store: S,
    signals: mpsc::Receiver<ShutdownSignal>,
) -> Result<Option<ShutdownSignal>> {
    let client = build_upstream_client().map_err(DaemonError::UpstreamClient)?;
    let router = Arc::new(ProxyRouter::new(settings.proxy.target.clone(), client));

    let acceptor = load_tls_acceptor(&settings.server.cert_file, &settings.server.key_file)?;
    let server = ProxyServer::bind(
        settings.server.listen,
        acceptor,
        router,
        settings.server.handshake_timeout(),
    )
    .await?;
    let handle = server.handle();

    let overrides = Arc::new(HostOverrides::new(
        store,
        settings.hosts.address,
        settings.well_known_hosts()?,
    ));
    overrides.install().await?;
    debug!("hosts saved");

    info!(
        "starting github proxy for {} via {}",
        overrides.hosts(),
        settings.proxy.target
    );
    let ((), received) = tokio::join!(
        server.serve(),
        run_lifecycle(
            Arc::clone(&overrides),
            signals,
            handle,
            settings.server.shutdown_timeout(),
        )
    );

    info!("github proxy exited");
    Ok(received)
}
