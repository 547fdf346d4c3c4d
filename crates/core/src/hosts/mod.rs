//! Local name-resolution overrides
//!
//! The proxy makes a fixed set of hostnames resolve to the loopback address
//! for as long as it runs. [`HostsStore`] is the seam to the resolution store,
//! [`HostsFile`] the implementation backed by the system hosts file, and
//! [`HostOverrides`] drives the install/revert lifecycle on top of a store.

pub mod file;
pub mod overrides;

#[cfg(any(test, feature = "tests"))]
pub mod memory;

use crate::error::{HostsError, HostsResult};
use async_trait::async_trait;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::ops::Deref;
use std::sync::Arc;

pub use file::HostsFile;
pub use overrides::{HostOverrides, OverrideState};

/// Address the well-known hosts are pointed at
pub const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// GitHub and its raw-content and gist domains
pub const GITHUB_HOSTS: &[&str] = &[
    "github.com",
    "raw.githubusercontent.com",
    "gist.github.com",
    "gist.githubusercontent.com",
];

/// A store of address-to-hostname mappings
#[async_trait]
pub trait HostsStore: Send {
    /// Map every name in `names` to `address`
    async fn add_hosts(&mut self, address: IpAddr, names: &[String]) -> HostsResult<()>;

    /// Drop every mapping for the names in `names`
    async fn remove_hosts(&mut self, names: &[String]) -> HostsResult<()>;

    /// Write the current mappings to durable storage
    async fn save(&mut self) -> HostsResult<()>;
}

/// Ordered, immutable list of hostnames intercepted by the proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WellKnownHosts(Arc<[String]>);

impl WellKnownHosts {
    /// Build a host set, rejecting names that cannot appear in a hosts file
    pub fn new<I, S>(names: I) -> HostsResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = names
            .into_iter()
            .map(|name| {
                let name = name.into();
                validate_hostname(&name)?;
                Ok(name.to_ascii_lowercase())
            })
            .collect::<HostsResult<Vec<_>>>()?;
        Ok(Self(names.into()))
    }

    /// The default GitHub host set
    pub fn github() -> Self {
        Self(GITHUB_HOSTS.iter().map(|h| (*h).to_string()).collect())
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl Default for WellKnownHosts {
    fn default() -> Self {
        Self::github()
    }
}

impl Deref for WellKnownHosts {
    type Target = [String];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for WellKnownHosts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

/// Check that a name can be written as a single hosts-file token
pub fn validate_hostname(name: &str) -> HostsResult<()> {
    let valid = !name.is_empty()
        && name.len() <= 253
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_'));
    if valid {
        Ok(())
    } else {
        Err(HostsError::InvalidHostname(name.to_string()))
    }
}
