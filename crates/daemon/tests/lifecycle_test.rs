//! Signal-driven teardown with an in-memory hosts store

use github_proxy_core::{HostOverrides, LOOPBACK, MemoryHosts, OverrideState, WellKnownHosts};
use github_proxy_daemon::{ServerHandle, ShutdownSignal, run_lifecycle};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const GRACE: Duration = Duration::from_millis(500);

async fn installed(store: &MemoryHosts) -> Arc<HostOverrides<MemoryHosts>> {
    let overrides = Arc::new(HostOverrides::new(
        store.clone(),
        LOOPBACK,
        WellKnownHosts::github(),
    ));
    overrides.install().await.unwrap();
    overrides
}

#[tokio::test]
async fn test_first_signal_reverts_and_stops_server() {
    let store = MemoryHosts::with_entries([("10.0.0.5", "build.internal")]);
    let overrides = installed(&store).await;
    let server = ServerHandle::new();
    let (tx, rx) = mpsc::channel(4);

    let lifecycle = tokio::spawn(run_lifecycle(
        Arc::clone(&overrides),
        rx,
        server.clone(),
        GRACE,
    ));
    tx.send(ShutdownSignal::Terminate).await.unwrap();
    // Anything after the first signal is ignored
    let _ = tx.send(ShutdownSignal::Interrupt).await;

    let received = lifecycle.await.unwrap();

    assert_eq!(received, Some(ShutdownSignal::Terminate));
    assert_eq!(store.remove_calls(), 1);
    let build: IpAddr = "10.0.0.5".parse().unwrap();
    assert_eq!(store.saved_entries(), vec![(build, "build.internal".to_string())]);
    assert!(server.is_shutting_down());
    assert_eq!(overrides.state().await, OverrideState::Terminated);
}

#[tokio::test]
async fn test_revert_failure_does_not_block_shutdown() {
    let store = MemoryHosts::new();
    let overrides = installed(&store).await;
    store.fail_saves(true);
    let server = ServerHandle::new();
    let (tx, rx) = mpsc::channel(4);

    tx.send(ShutdownSignal::Hangup).await.unwrap();
    let received = run_lifecycle(Arc::clone(&overrides), rx, server.clone(), GRACE).await;

    assert_eq!(received, Some(ShutdownSignal::Hangup));
    assert!(server.is_shutting_down());
    assert_eq!(overrides.state().await, OverrideState::Terminated);
    // The last successful save still holds the overrides
    assert_eq!(store.saved_entries().len(), WellKnownHosts::github().len());
    assert_eq!(store.remove_calls(), 1);
}

#[tokio::test]
async fn test_closed_channel_tears_down() {
    let store = MemoryHosts::new();
    let overrides = installed(&store).await;
    let server = ServerHandle::new();
    let (tx, rx) = mpsc::channel::<ShutdownSignal>(1);
    drop(tx);

    let received = run_lifecycle(Arc::clone(&overrides), rx, server.clone(), GRACE).await;

    assert_eq!(received, None);
    assert!(store.saved_entries().is_empty());
    assert!(server.is_shutting_down());
}

#[tokio::test]
async fn test_signal_before_install_leaves_store_alone() {
    let store = MemoryHosts::new();
    let overrides = Arc::new(HostOverrides::new(
        store.clone(),
        LOOPBACK,
        WellKnownHosts::github(),
    ));
    let server = ServerHandle::new();
    let (tx, rx) = mpsc::channel(1);

    tx.send(ShutdownSignal::Quit).await.unwrap();
    run_lifecycle(Arc::clone(&overrides), rx, server.clone(), GRACE).await;

    assert_eq!(store.remove_calls(), 0);
    assert_eq!(store.save_calls(), 0);
    assert!(server.is_shutting_down());
}
