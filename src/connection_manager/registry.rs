use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::stats::RegistryStats;
use super::types::{Connection, ConnectionId, CountChange, RegistryError};

/// Tracks every live connection and which user owns it.
///
/// Lock order is always `users` entry first, then `connections`. Mutations
/// for one user therefore serialize on that user's shard while unrelated
/// users proceed in parallel, and both maps change together for a handle.
pub struct ConnectionRegistry {
    /// connection_id -> Connection
    connections: DashMap<ConnectionId, Arc<Connection>>,
    /// user_id -> Set<connection_id> (supports multiple devices)
    users: DashMap<String, HashSet<ConnectionId>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            users: DashMap::new(),
        }
    }

    /// Register a connection for its user.
    ///
    /// Re-adding a handle for the same user is a no-op; re-adding it for a
    /// different user is rejected.
    pub fn add(&self, connection: Arc<Connection>) -> Result<CountChange, RegistryError> {
        let user_id = connection.user_id.clone();
        let conn_id = connection.id.clone();

        let mut user_conns = self.users.entry(user_id.clone()).or_default();
        let previous = user_conns.len();

        match self.connections.entry(conn_id.clone()) {
            Entry::Occupied(existing) => {
                let existing_user = existing.get().user_id.clone();
                drop(existing);
                if previous == 0 {
                    drop(user_conns);
                    self.users.remove_if(&user_id, |_, conns| conns.is_empty());
                }

                if existing_user == user_id {
                    tracing::debug!(connection_id = %conn_id, user_id = %user_id, "Connection already registered");
                    return Ok(CountChange {
                        user_id,
                        previous,
                        current: previous,
                    });
                }

                tracing::error!(
                    connection_id = %conn_id,
                    existing_user = %existing_user,
                    requested_user = %user_id,
                    "Connection handle reused across users"
                );
                Err(RegistryError::HandleReuse {
                    handle: conn_id,
                    existing_user,
                    requested_user: user_id,
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(connection);
                user_conns.insert(conn_id.clone());
                let current = user_conns.len();

                tracing::info!(
                    connection_id = %conn_id,
                    user_id = %user_id,
                    connections = current,
                    "Connection registered"
                );

                Ok(CountChange {
                    user_id,
                    previous,
                    current,
                })
            }
        }
    }

    /// Remove a connection. Unknown handles are ignored.
    pub fn remove(&self, connection_id: &ConnectionId) -> Option<(Arc<Connection>, CountChange)> {
        let user_id = self.user_of(connection_id)?;

        let Entry::Occupied(mut user_conns) = self.users.entry(user_id.clone()) else {
            return None;
        };

        // Re-check under the user's lock; a concurrent remove may have won
        let (_, connection) = self
            .connections
            .remove_if(connection_id, |_, conn| conn.user_id == user_id)?;

        let previous = user_conns.get().len();
        user_conns.get_mut().remove(connection_id);
        let current = user_conns.get().len();
        if current == 0 {
            user_conns.remove();
        }

        tracing::info!(
            connection_id = %connection_id,
            user_id = %user_id,
            connections = current,
            "Connection unregistered"
        );

        Some((
            connection,
            CountChange {
                user_id,
                previous,
                current,
            },
        ))
    }

    /// Handles of every live connection for a user
    pub fn connections_of(&self, user_id: &str) -> HashSet<ConnectionId> {
        self.users
            .get(user_id)
            .map(|conns| conns.clone())
            .unwrap_or_default()
    }

    /// Handles for several users at once; users without connections map to an empty set
    pub fn connections_of_many<S: AsRef<str>>(
        &self,
        user_ids: &[S],
    ) -> HashMap<String, HashSet<ConnectionId>> {
        user_ids
            .iter()
            .map(|user_id| {
                let user_id = user_id.as_ref();
                (user_id.to_string(), self.connections_of(user_id))
            })
            .collect()
    }

    pub fn user_of(&self, connection_id: &ConnectionId) -> Option<String> {
        self.connections
            .get(connection_id)
            .map(|conn| conn.user_id.clone())
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.count_of(user_id) > 0
    }

    pub fn count_of(&self, user_id: &str) -> usize {
        self.users.get(user_id).map(|conns| conns.len()).unwrap_or(0)
    }

    /// Get connection by ID
    pub fn get(&self, connection_id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections.get(connection_id).map(|c| c.clone())
    }

    /// Get all connections
    pub fn all(&self) -> Vec<Arc<Connection>> {
        self.connections.iter().map(|r| r.value().clone()).collect()
    }

    /// Handles of connections with no activity for longer than `timeout_secs`
    pub fn find_stale(&self, timeout_secs: u64) -> Vec<ConnectionId> {
        let now = chrono::Utc::now();
        let timeout = chrono::Duration::seconds(timeout_secs as i64);

        self.connections
            .iter()
            .filter(|entry| now.signed_duration_since(entry.value().last_activity()) > timeout)
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            total_connections: self.connections.len(),
            online_users: self.users.len(),
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn connection(id: &str, user: &str) -> Arc<Connection> {
        let (tx, _rx) = mpsc::channel(8);
        Arc::new(Connection::new(ConnectionId::from(id), user, tx))
    }

    #[test]
    fn test_add_and_lookup() {
        let registry = ConnectionRegistry::new();
        let change = registry.add(connection("c1", "alice")).unwrap();

        assert_eq!(change.previous, 0);
        assert_eq!(change.current, 1);
        assert_eq!(registry.user_of(&"c1".into()).as_deref(), Some("alice"));
        assert!(registry.is_online("alice"));
        assert_eq!(registry.count_of("alice"), 1);
        assert!(registry.connections_of("alice").contains(&ConnectionId::from("c1")));
    }

    #[test]
    fn test_add_same_handle_same_user_is_noop() {
        let registry = ConnectionRegistry::new();
        registry.add(connection("c1", "alice")).unwrap();
        let change = registry.add(connection("c1", "alice")).unwrap();

        assert!(change.is_unchanged());
        assert_eq!(registry.count_of("alice"), 1);
    }

    #[test]
    fn test_add_same_handle_other_user_is_rejected() {
        let registry = ConnectionRegistry::new();
        registry.add(connection("c1", "alice")).unwrap();

        let err = registry.add(connection("c1", "bob")).unwrap_err();
        assert!(matches!(err, RegistryError::HandleReuse { .. }));
        assert_eq!(registry.user_of(&"c1".into()).as_deref(), Some("alice"));
        assert!(!registry.is_online("bob"));
        assert_eq!(registry.stats().online_users, 1);
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let registry = ConnectionRegistry::new();
        assert!(registry.remove(&"missing".into()).is_none());
    }

    #[test]
    fn test_remove_clears_both_maps() {
        let registry = ConnectionRegistry::new();
        registry.add(connection("c1", "alice")).unwrap();
        registry.add(connection("c2", "alice")).unwrap();

        let (_, change) = registry.remove(&"c1".into()).unwrap();
        assert_eq!((change.previous, change.current), (2, 1));
        assert!(registry.user_of(&"c1".into()).is_none());
        assert!(registry.is_online("alice"));

        let (_, change) = registry.remove(&"c2".into()).unwrap();
        assert_eq!((change.previous, change.current), (1, 0));
        assert!(!registry.is_online("alice"));
        assert_eq!(registry.stats().online_users, 0);
        assert_eq!(registry.stats().total_connections, 0);

        // second remove of the same handle is a no-op
        assert!(registry.remove(&"c2".into()).is_none());
    }

    #[test]
    fn test_connections_of_many_includes_offline_users() {
        let registry = ConnectionRegistry::new();
        registry.add(connection("c1", "alice")).unwrap();

        let map = registry.connections_of_many(&["alice", "bob"]);
        assert_eq!(map["alice"].len(), 1);
        assert!(map["bob"].is_empty());
    }

    #[test]
    fn test_find_stale() {
        let registry = ConnectionRegistry::new();
        let old = connection("c1", "alice");
        old.set_last_activity(chrono::Utc::now() - chrono::Duration::seconds(120));
        registry.add(old).unwrap();
        registry.add(connection("c2", "bob")).unwrap();

        assert_eq!(registry.find_stale(30), vec![ConnectionId::from("c1")]);
    }

    #[test]
    fn test_concurrent_add_remove_same_user() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut threads = Vec::new();

        for t in 0..8 {
            let registry = registry.clone();
            threads.push(std::thread::spawn(move || {
                for i in 0..200 {
                    let id = format!("t{}-{}", t, i);
                    registry.add(connection(&id, "shared")).unwrap();
                    if i % 2 == 0 {
                        registry.remove(&ConnectionId::from(id.as_str())).unwrap();
                    }
                }
            }));
        }
        for handle in threads {
            handle.join().unwrap();
        }

        assert_eq!(registry.count_of("shared"), 8 * 100);
        assert_eq!(registry.stats().total_connections, 8 * 100);
    }
}
