//! In-memory hosts store for tests

use super::HostsStore;
use crate::error::{HostsError, HostsResult};
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct State {
    entries: Vec<(IpAddr, String)>,
    saved: Vec<(IpAddr, String)>,
    remove_calls: usize,
    save_calls: usize,
    fail_saves: bool,
}

/// Hosts store kept in memory.
///
/// Clones share state, so a test can hand one clone to the code under test
/// and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct MemoryHosts {
    state: Arc<Mutex<State>>,
}

impl MemoryHosts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with pre-existing, already persisted entries
    ///
    /// # Panics
    ///
    /// Panics if an address does not parse
    pub fn with_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let store = Self::new();
        {
            let mut state = store.lock();
            state.entries = entries
                .into_iter()
                .map(|(address, name)| {
                    (
                        address.parse().expect("test address must parse"),
                        name.to_string(),
                    )
                })
                .collect();
            state.saved = state.entries.clone();
        }
        store
    }

    /// Make every following `save` fail
    pub fn fail_saves(&self, fail: bool) {
        self.lock().fail_saves = fail;
    }

    /// Entries as of the last successful save
    pub fn saved_entries(&self) -> Vec<(IpAddr, String)> {
        self.lock().saved.clone()
    }

    pub fn remove_calls(&self) -> usize {
        self.lock().remove_calls
    }

    pub fn save_calls(&self) -> usize {
        self.lock().save_calls
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl HostsStore for MemoryHosts {
    async fn add_hosts(&mut self, address: IpAddr, names: &[String]) -> HostsResult<()> {
        let mut state = self.lock();
        for name in names {
            state.entries.retain(|(_, n)| n != name);
            state.entries.push((address, name.clone()));
        }
        Ok(())
    }

    async fn remove_hosts(&mut self, names: &[String]) -> HostsResult<()> {
        let mut state = self.lock();
        state.remove_calls += 1;
        state.entries.retain(|(_, n)| !names.contains(n));
        Ok(())
    }

    async fn save(&mut self) -> HostsResult<()> {
        let mut state = self.lock();
        state.save_calls += 1;
        if state.fail_saves {
            return Err(HostsError::store("save rejected"));
        }
        state.saved = state.entries.clone();
        Ok(())
    }
}
