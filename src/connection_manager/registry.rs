use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use super::stats::RegistryStats;
use super::types::{ConnectionHandle, Identity};

#[derive(Default)]
struct RegistryInner {
    /// identity -> current connection (single active session per identity)
    online: HashMap<Identity, Arc<ConnectionHandle>>,
    /// connection_id -> identity it is currently bound to
    bound: HashMap<Uuid, Identity>,
}

/// In-memory map of who is online and on which connection.
///
/// Every operation runs under one mutex so that a mutation and the
/// "did the online set change" answer are a single atomic step. The lock is
/// never held across an `.await`; callers push to handles after it is released.
pub struct Registry {
    inner: Mutex<RegistryInner>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        // No operation leaves the maps half-updated, so a poisoned lock is still usable
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind `identity` to `handle`, replacing any earlier connection for that identity.
    ///
    /// Returns `true` when the online set changed: a new identity came online, or
    /// this connection was previously bound to a different identity that is now
    /// released. Re-identifying an identity that is already online returns `false`.
    pub fn register(&self, identity: &str, handle: &Arc<ConnectionHandle>) -> bool {
        let mut inner = self.lock();
        let mut changed = false;

        // A connection speaks for one identity at a time
        if let Some(previous) = inner.bound.get(&handle.id).cloned() {
            if previous != identity {
                let still_ours = inner
                    .online
                    .get(&previous)
                    .is_some_and(|current| current.id == handle.id);
                if still_ours {
                    inner.online.remove(&previous);
                    changed = true;
                }
            }
        }

        let replaced = inner.online.insert(identity.to_string(), handle.clone());
        match replaced {
            None => changed = true,
            Some(supplanted) if supplanted.id != handle.id => {
                inner.bound.remove(&supplanted.id);
                tracing::info!(
                    identity = %identity,
                    supplanted_connection_id = %supplanted.id,
                    connection_id = %handle.id,
                    "Identity moved to a newer connection"
                );
            }
            Some(_) => {}
        }
        inner.bound.insert(handle.id, identity.to_string());

        tracing::debug!(
            identity = %identity,
            connection_id = %handle.id,
            online_changed = changed,
            "Identity registered"
        );

        changed
    }

    /// Remove the entry bound to `handle`, but only while that entry still
    /// points at `handle`. A disconnect from a connection that has since been
    /// supplanted by a newer one for the same identity leaves the newer entry alone.
    ///
    /// Returns `true` if an entry was removed.
    pub fn unregister(&self, handle: &ConnectionHandle) -> bool {
        let mut inner = self.lock();

        let Some(identity) = inner.bound.remove(&handle.id) else {
            return false;
        };

        let is_current = inner
            .online
            .get(&identity)
            .is_some_and(|current| current.id == handle.id);
        if !is_current {
            tracing::debug!(
                identity = %identity,
                connection_id = %handle.id,
                "Ignoring stale disconnect"
            );
            return false;
        }

        inner.online.remove(&identity);
        tracing::debug!(identity = %identity, connection_id = %handle.id, "Identity unregistered");
        true
    }

    pub fn lookup(&self, identity: &str) -> Option<Arc<ConnectionHandle>> {
        self.lock().online.get(identity).cloned()
    }

    /// Current online set
    pub fn snapshot(&self) -> BTreeSet<Identity> {
        self.lock().online.keys().cloned().collect()
    }

    pub fn is_online(&self, identity: &str) -> bool {
        self.lock().online.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.lock().online.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().online.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        let inner = self.lock();
        RegistryStats {
            online_users: inner.online.len(),
            bound_connections: inner.bound.len(),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
