//! In-process presence tracking with multi-connection support.
//!
//! Presence is per-**user**: a user is online while at least one of their
//! gateway connections is alive. First/last transition detection happens
//! under the DashMap shard lock, so concurrent connects and disconnects
//! for one user serialize and each transition is reported exactly once.

use std::collections::HashMap;
use std::collections::HashSet;

use dashmap::DashMap;

/// Thread-safe, DashMap-backed presence registry.
///
/// Invariant: a user id is present in the map iff their connection set is
/// non-empty.
pub struct PresenceRegistry {
    inner: DashMap<String, HashSet<String>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    /// Record a new connection for a user.
    ///
    /// Returns `true` iff this is the user's first live connection, i.e.
    /// the offline→online transition the caller should broadcast.
    pub fn register(&self, user_id: &str, connection_id: &str) -> bool {
        let mut entry = self.inner.entry(user_id.to_string()).or_default();
        let was_offline = entry.is_empty();
        entry.insert(connection_id.to_string());
        was_offline
    }

    /// Remove a connection for a user.
    ///
    /// Returns `true` iff this was the user's last live connection. The
    /// map entry is removed in the same critical section, preserving the
    /// non-empty-set invariant.
    pub fn unregister(&self, user_id: &str, connection_id: &str) -> bool {
        let removed = self.inner.remove_if_mut(user_id, |_, connections| {
            connections.remove(connection_id);
            connections.is_empty()
        });
        removed.is_some()
    }

    /// Connection ids currently registered for a user.
    pub fn connections_for(&self, user_id: &str) -> Vec<String> {
        self.inner
            .get(user_id)
            .map(|entry| entry.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.inner.contains_key(user_id)
    }

    /// Online flags for a batch of user ids, as sent to clients.
    pub fn online_status(&self, user_ids: &[String]) -> HashMap<String, bool> {
        user_ids
            .iter()
            .map(|id| (id.clone(), self.is_online(id)))
            .collect()
    }
}
