//! Signal-driven teardown: revert the hosts overrides, then stop the server

use crate::server::ServerHandle;
use github_proxy_core::{HostOverrides, HostsStore};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Termination signals that end the process lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Hangup,
    Interrupt,
    Terminate,
    Quit,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Hangup => "hangup",
            Self::Interrupt => "interrupt",
            Self::Terminate => "terminated",
            Self::Quit => "quit",
        };
        f.write_str(name)
    }
}

/// Register handlers for SIGHUP, SIGINT, SIGTERM and SIGQUIT and forward
/// every delivery into a channel.
///
/// Once registered, the default action of these signals is suppressed for
/// the rest of the process.
///
/// # Errors
///
/// Returns an error if a handler cannot be registered
#[cfg(unix)]
pub fn listen_for_signals() -> std::io::Result<mpsc::Receiver<ShutdownSignal>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = signal(SignalKind::hangup())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;

    let (tx, rx) = mpsc::channel(4);
    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                Some(()) = hangup.recv() => ShutdownSignal::Hangup,
                Some(()) = interrupt.recv() => ShutdownSignal::Interrupt,
                Some(()) = terminate.recv() => ShutdownSignal::Terminate,
                Some(()) = quit.recv() => ShutdownSignal::Quit,
                else => break,
            };
            if tx.send(received).await.is_err() {
                break;
            }
        }
    });

    Ok(rx)
}

/// Forward Ctrl-C into a channel
///
/// # Errors
///
/// Never fails on this platform
#[cfg(not(unix))]
pub fn listen_for_signals() -> std::io::Result<mpsc::Receiver<ShutdownSignal>> {
    let (tx, rx) = mpsc::channel(4);
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(ShutdownSignal::Interrupt).await.is_err() {
                break;
            }
        }
    });
    Ok(rx)
}

/// Wait for the first termination signal, then tear down.
///
/// The overrides are reverted before the server is asked to stop, and a
/// failed revert does not keep the server running. Signals after the first
/// are ignored. A closed channel is treated like a signal.
pub async fn run_lifecycle<S: HostsStore>(
    overrides: Arc<HostOverrides<S>>,
    mut signals: mpsc::Receiver<ShutdownSignal>,
    server: ServerHandle,
    grace: Duration,
) -> Option<ShutdownSignal> {
    let received = signals.recv().await;
    match received {
        Some(signal) => debug!("signal received: {}", signal),
        None => debug!("signal channel closed"),
    }
    drop(signals);

    match overrides.revert().await {
        Ok(true) => debug!("hosts reverted"),
        Ok(false) => {}
        Err(e) => error!("hosts save error: {}", e),
    }

    if let Err(e) = server.shutdown(grace).await {
        error!("server shutdown error: {}", e);
    }
    debug!("server shutdown");

    overrides.terminate().await;
    received
}
