//! Startup ordering against an in-memory hosts store

mod common;

use common::{TestCert, closed_port, test_cert};
use github_proxy_core::{LOOPBACK, MemoryHosts, WellKnownHosts};
use github_proxy_daemon::{DaemonError, ListenError, Settings, ShutdownSignal, run};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

fn settings(cert: &TestCert, listen: SocketAddr) -> Settings {
    let mut settings = Settings::default();
    settings.server.listen = listen;
    settings.server.cert_file = cert.cert_file.clone();
    settings.server.key_file = cert.key_file.clone();
    settings.server.shutdown_timeout_secs = 1;
    settings.proxy.target = "http://127.0.0.1:9".to_string();
    settings
}

fn existing() -> Vec<(IpAddr, String)> {
    vec![("10.0.0.5".parse().unwrap(), "build.internal".to_string())]
}

#[tokio::test]
async fn test_bind_conflict_leaves_hosts_untouched() {
    let cert = test_cert();
    let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let store = MemoryHosts::with_entries([("10.0.0.5", "build.internal")]);
    let (_tx, rx) = mpsc::channel(1);

    let err = run(settings(&cert, occupied.local_addr().unwrap()), store.clone(), rx)
        .await
        .unwrap_err();

    assert!(matches!(err, DaemonError::Listen(ListenError::Bind { .. })));
    assert_eq!(store.save_calls(), 0);
    assert_eq!(store.saved_entries(), existing());
}

#[tokio::test]
async fn test_failed_install_aborts_before_serving() {
    let cert = test_cert();
    let listen = closed_port().await;
    let store = MemoryHosts::with_entries([("10.0.0.5", "build.internal")]);
    store.fail_saves(true);
    let (_tx, rx) = mpsc::channel(1);

    let err = run(settings(&cert, listen), store.clone(), rx)
        .await
        .unwrap_err();

    assert!(matches!(err, DaemonError::OverrideStore(_)));
    assert_eq!(store.save_calls(), 1);
    assert_eq!(store.saved_entries(), existing());
    // The listener went away with the aborted startup
    assert!(TcpStream::connect(listen).await.is_err());
}

#[tokio::test]
async fn test_signal_after_install_reverts_hosts() {
    let cert = test_cert();
    let listen = closed_port().await;
    let store = MemoryHosts::with_entries([("10.0.0.5", "build.internal")]);
    let (tx, rx) = mpsc::channel(1);

    let driver = {
        let store = store.clone();
        async move {
            while store.save_calls() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            let installed = store.saved_entries();
            assert!(TcpStream::connect(listen).await.is_ok());
            tx.send(ShutdownSignal::Terminate).await.unwrap();
            installed
        }
    };

    let (result, installed) = tokio::join!(run(settings(&cert, listen), store.clone(), rx), driver);

    assert_eq!(result.unwrap(), Some(ShutdownSignal::Terminate));
    assert_eq!(installed.len(), 1 + WellKnownHosts::github().len());
    assert!(installed.contains(&(LOOPBACK, "github.com".to_string())));
    assert_eq!(store.save_calls(), 2);
    assert_eq!(store.remove_calls(), 1);
    assert_eq!(store.saved_entries(), existing());
}
