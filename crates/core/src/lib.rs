//! Core types for the GitHub mirror proxy
//!
//! This crate holds everything that does not depend on the HTTP stack:
//! - the well-known host set that gets redirected to the local proxy
//! - the hosts-file override store and its install/revert lifecycle
//! - shared error types and tracing initialization

pub mod error;
pub mod hosts;
pub mod tracing;

pub use error::{HostsError, HostsResult};
pub use hosts::{
    GITHUB_HOSTS, HostOverrides, HostsFile, HostsStore, LOOPBACK, OverrideState, WellKnownHosts,
};

#[cfg(any(test, feature = "tests"))]
pub use hosts::memory::MemoryHosts;
