use std::{collections::HashMap, sync::Arc};

use dashmap::{mapref::entry::Entry, DashMap};
use metrics::gauge;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, error};

use beach_pier_core::Identity;

use crate::sink::SessionSink;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("identity {0} is already registered")]
    DuplicateIdentity(Identity),
}

/// Shared table of live sessions.
///
/// Sinks and display names are held in two independently locked structures.
/// No method holds both at once, so there is no lock ordering to get wrong.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<SessionRegistryInner>,
}

#[derive(Default)]
struct SessionRegistryInner {
    sinks: DashMap<Identity, SessionSink>,
    names: RwLock<HashMap<Identity, String>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new session. A duplicate identity is an invariant
    /// violation: the existing entry is left untouched and an error returned.
    pub fn add(&self, identity: Identity, sink: SessionSink) -> Result<(), RegistryError> {
        match self.inner.sinks.entry(identity) {
            Entry::Occupied(_) => {
                error!(identity = %identity, "refusing to overwrite registered identity");
                Err(RegistryError::DuplicateIdentity(identity))
            }
            Entry::Vacant(entry) => {
                entry.insert(sink);
                gauge!("beach_pier_sessions_active", self.inner.sinks.len() as f64);
                debug!(identity = %identity, "session registered");
                Ok(())
            }
        }
    }

    /// Removes a session and its name. Returns whether it was present;
    /// removing an unknown identity is a no-op.
    pub fn remove(&self, identity: Identity) -> bool {
        let removed = self.inner.sinks.remove(&identity).is_some();
        self.inner.names.write().remove(&identity);
        if removed {
            gauge!("beach_pier_sessions_active", self.inner.sinks.len() as f64);
            debug!(identity = %identity, "session removed");
        }
        removed
    }

    pub fn get_sink(&self, identity: Identity) -> Option<SessionSink> {
        self.inner
            .sinks
            .get(&identity)
            .map(|entry| entry.value().clone())
    }

    pub fn contains(&self, identity: Identity) -> bool {
        self.inner.sinks.contains_key(&identity)
    }

    /// Records a display name. Names for identities that already left are
    /// dropped so a late write cannot resurrect a removed session.
    pub fn set_name(&self, identity: Identity, name: impl Into<String>) {
        if !self.contains(identity) {
            return;
        }
        self.inner.names.write().insert(identity, name.into());
        if !self.contains(identity) {
            self.inner.names.write().remove(&identity);
        }
    }

    pub fn get_name(&self, identity: Identity) -> Option<String> {
        self.inner.names.read().get(&identity).cloned()
    }

    /// Point-in-time snapshot of `(identity, name)` pairs, ordered by identity.
    pub fn list_all(&self) -> Vec<(Identity, Option<String>)> {
        let mut identities: Vec<Identity> =
            self.inner.sinks.iter().map(|entry| *entry.key()).collect();
        identities.sort();

        let names = self.inner.names.read();
        identities
            .into_iter()
            .map(|identity| (identity, names.get(&identity).cloned()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.sinks.is_empty()
    }

    /// Best-effort delivery of one line to every registered session.
    /// Returns how many sinks accepted it.
    pub async fn broadcast(&self, line: &str) -> usize {
        let sinks: Vec<SessionSink> = self
            .inner
            .sinks
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut delivered = 0usize;
        for sink in sinks {
            if sink.send(line).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}
