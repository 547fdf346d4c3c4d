//! Install/revert lifecycle of the loopback overrides

use super::{HostsStore, WellKnownHosts};
use crate::error::{HostsError, HostsResult};
use std::fmt;
use std::net::IpAddr;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Lifecycle state of the override record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideState {
    /// Nothing written yet
    Idle,
    /// Mappings are in the store
    Installed,
    /// Removal started; never re-entered
    Reverting,
    /// Removal attempted and the server shut down
    Terminated,
}

impl fmt::Display for OverrideState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OverrideState::Idle => "idle",
            OverrideState::Installed => "installed",
            OverrideState::Reverting => "reverting",
            OverrideState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

struct Inner<S> {
    store: S,
    state: OverrideState,
}

/// Points the well-known hosts at a local address for the process lifetime
pub struct HostOverrides<S> {
    inner: Mutex<Inner<S>>,
    address: IpAddr,
    hosts: WellKnownHosts,
}

impl<S: HostsStore> HostOverrides<S> {
    pub fn new(store: S, address: IpAddr, hosts: WellKnownHosts) -> Self {
        Self {
            inner: Mutex::new(Inner {
                store,
                state: OverrideState::Idle,
            }),
            address,
            hosts,
        }
    }

    pub fn hosts(&self) -> &WellKnownHosts {
        &self.hosts
    }

    pub async fn state(&self) -> OverrideState {
        self.inner.lock().await.state
    }

    /// Add the override record and persist it.
    ///
    /// Only valid from [`OverrideState::Idle`]. On failure the state stays
    /// idle and the caller must not start serving.
    pub async fn install(&self) -> HostsResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.state != OverrideState::Idle {
            return Err(HostsError::InvalidTransition {
                action: "install",
                state: inner.state,
            });
        }

        inner.store.add_hosts(self.address, &self.hosts).await?;
        inner.store.save().await?;
        inner.state = OverrideState::Installed;

        info!("Pointed {} at {}", self.hosts, self.address);
        Ok(())
    }

    /// Remove the override record and persist the store.
    ///
    /// The first call after a successful install performs the removal and
    /// returns `Ok(true)`; every other call is a no-op returning `Ok(false)`.
    /// A failed removal is not retried.
    pub async fn revert(&self) -> HostsResult<bool> {
        let mut inner = self.inner.lock().await;
        if inner.state != OverrideState::Installed {
            debug!("Skipping hosts revert while {}", inner.state);
            return Ok(false);
        }
        inner.state = OverrideState::Reverting;

        inner.store.remove_hosts(&self.hosts).await?;
        inner.store.save().await?;

        info!("Removed overrides for {}", self.hosts);
        Ok(true)
    }

    /// Mark the lifecycle finished
    pub async fn terminate(&self) {
        self.inner.lock().await.state = OverrideState::Terminated;
    }
}
