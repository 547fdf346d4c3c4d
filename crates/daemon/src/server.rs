//! TLS listener that hands every request to the router

use crate::error::{ListenError, ShutdownError};
use crate::router::ProxyRouter;
use http_body_util::BodyExt;
use hyper::Request;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use rustls::ServerConfig;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};

/// Build a TLS acceptor from PEM files, advertising `h2` and `http/1.1`
///
/// # Errors
///
/// Returns an error if either file is unreadable or the pair is rejected
pub fn load_tls_acceptor(cert_file: &Path, key_file: &Path) -> Result<TlsAcceptor, ListenError> {
    let certificate_error = |reason: String| ListenError::Certificate {
        path: cert_file.to_path_buf(),
        reason,
    };

    let certs = CertificateDer::pem_file_iter(cert_file)
        .map_err(|e| certificate_error(e.to_string()))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| certificate_error(e.to_string()))?;
    if certs.is_empty() {
        return Err(certificate_error("no certificates found".to_string()));
    }

    let key = PrivateKeyDer::from_pem_file(key_file).map_err(|e| ListenError::PrivateKey {
        path: key_file.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut config =
        ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_single_cert(certs, key)?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Stops a running [`ProxyServer`] and waits for its connections
#[derive(Debug, Clone, Default)]
pub struct ServerHandle {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl ServerHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Connections still being served
    pub fn active_connections(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting, ask every connection to finish its in-flight
    /// requests, and wait up to `grace` for them.
    ///
    /// # Errors
    ///
    /// Returns [`ShutdownError::Timeout`] if connections remain after `grace`
    pub async fn shutdown(&self, grace: Duration) -> Result<(), ShutdownError> {
        self.token.cancel();
        self.tracker.close();

        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            return Err(ShutdownError::Timeout {
                grace,
                active: self.tracker.len(),
            });
        }
        Ok(())
    }
}

/// HTTPS server terminating TLS for the intercepted hosts
pub struct ProxyServer {
    listener: TcpListener,
    acceptor: TlsAcceptor,
    router: Arc<ProxyRouter>,
    handshake_timeout: Duration,
    handle: ServerHandle,
}

impl ProxyServer {
    /// Bind the listening socket
    ///
    /// # Errors
    ///
    /// Returns [`ListenError::Bind`] if the address is unavailable
    pub async fn bind(
        addr: SocketAddr,
        acceptor: TlsAcceptor,
        router: Arc<ProxyRouter>,
        handshake_timeout: Duration,
    ) -> Result<Self, ListenError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ListenError::Bind { addr, source })?;

        Ok(Self {
            listener,
            acceptor,
            router,
            handshake_timeout,
            handle: ServerHandle::new(),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    /// Accept connections until the handle is shut down
    pub async fn serve(self) {
        if let Ok(addr) = self.local_addr() {
            info!("Listening on https://{}", addr);
        }

        let token = self.handle.token.clone();
        loop {
            let (stream, remote) = tokio::select! {
                () = token.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        continue;
                    }
                },
            };

            self.handle.tracker.spawn(serve_connection(
                stream,
                remote,
                self.acceptor.clone(),
                Arc::clone(&self.router),
                self.handshake_timeout,
                token.clone(),
            ));
        }

        debug!("Stopped accepting connections");
    }
}

#[instrument(skip_all, fields(remote = %remote))]
async fn serve_connection(
    stream: TcpStream,
    remote: SocketAddr,
    acceptor: TlsAcceptor,
    router: Arc<ProxyRouter>,
    handshake_timeout: Duration,
    token: CancellationToken,
) {
    let tls = match tokio::time::timeout(handshake_timeout, acceptor.accept(stream)).await {
        Ok(Ok(tls)) => tls,
        Ok(Err(e)) => {
            debug!("TLS handshake failed: {}", e);
            return;
        }
        Err(_) => {
            debug!("TLS handshake timed out");
            return;
        }
    };

    let service = service_fn(move |request: Request<Incoming>| {
        let router = Arc::clone(&router);
        async move {
            let request = request.map(BodyExt::boxed);
            Ok::<_, Infallible>(router.handle(request, remote).await)
        }
    });

    let builder = auto::Builder::new(TokioExecutor::new());
    let conn = builder.serve_connection(TokioIo::new(tls), service);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        () = token.cancelled() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };

    if let Err(e) = result {
        debug!("Connection closed with error: {}", e);
    }
}
