//! Presence derivation on top of the connection registry.
//!
//! A user is online while they hold at least one live connection. Only the
//! 0→1 and 1→0 edges are announced; extra devices joining or leaving an
//! already-online user stay silent.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::connection_manager::{
    Connection, ConnectionId, ConnectionRegistry, CountChange, GroupRegistry, RegistryError,
};
use crate::metrics::{ConnectionMetrics, PresenceMetrics};
use crate::notification::NotificationDispatcher;

const SIGNAL_CAPACITY: usize = 256;

/// A presence edge for one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PresenceEvent {
    Online { user_id: String },
    Offline { user_id: String },
}

impl PresenceEvent {
    pub fn user_id(&self) -> &str {
        match self {
            Self::Online { user_id } | Self::Offline { user_id } => user_id,
        }
    }

    /// Edge implied by a registry count change, if any
    pub fn from_change(change: &CountChange) -> Option<Self> {
        match (change.previous, change.current) {
            (0, 1) => Some(Self::Online {
                user_id: change.user_id.clone(),
            }),
            (1, 0) => Some(Self::Offline {
                user_id: change.user_id.clone(),
            }),
            _ => None,
        }
    }
}

pub struct PresenceCoordinator {
    registry: Arc<ConnectionRegistry>,
    groups: Arc<GroupRegistry>,
    dispatcher: Arc<NotificationDispatcher>,
    signals: broadcast::Sender<PresenceEvent>,
    /// Per-user edge counter. Its entry guard is held from the registry
    /// mutation until the edge has been broadcast, so edges for one user
    /// reach watchers in the order the registry observed them.
    edges: DashMap<String, u64>,
}

impl PresenceCoordinator {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        groups: Arc<GroupRegistry>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        let (signals, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self {
            registry,
            groups,
            dispatcher,
            signals,
            edges: DashMap::new(),
        }
    }

    /// Subscribe to presence edges as they happen
    pub fn subscribe(&self) -> broadcast::Receiver<PresenceEvent> {
        self.signals.subscribe()
    }

    /// Register a freshly negotiated connection and announce the user if this
    /// is their first one.
    #[tracing::instrument(
        name = "presence.connection_opened",
        skip(self, connection),
        fields(connection_id = %connection.id, user_id = %connection.user_id)
    )]
    pub fn connection_opened(
        &self,
        connection: Arc<Connection>,
    ) -> Result<Option<PresenceEvent>, RegistryError> {
        let mut sequence = self.edges.entry(connection.user_id.clone()).or_insert(0);
        let change = self.registry.add(connection)?;
        Ok(self.apply(&change, &mut sequence))
    }

    /// Drop a connection from the registry and every group it joined.
    ///
    /// Closing an unknown handle is a no-op, so racing close paths are safe.
    #[tracing::instrument(name = "presence.connection_closed", skip(self), fields(connection_id = %connection_id))]
    pub fn connection_closed(&self, connection_id: &ConnectionId) -> Option<PresenceEvent> {
        self.groups.remove_connection(connection_id);
        let user_id = self.registry.user_of(connection_id)?;

        let event = {
            let mut sequence = self.edges.entry(user_id.clone()).or_insert(0);
            let (_, change) = self.registry.remove(connection_id)?;
            self.apply(&change, &mut sequence)
        };

        if matches!(event, Some(PresenceEvent::Offline { .. })) {
            self.edges
                .remove_if(&user_id, |user, _| !self.registry.is_online(user));
        }
        event
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.registry.is_online(user_id)
    }

    /// Online flag for each requested user
    pub fn bulk_status<S: AsRef<str>>(&self, user_ids: &[S]) -> HashMap<String, bool> {
        user_ids
            .iter()
            .map(|user_id| {
                let user_id = user_id.as_ref();
                (user_id.to_string(), self.registry.is_online(user_id))
            })
            .collect()
    }

    /// Announce the edge implied by `change`. Callers hold the user's edge
    /// entry for the whole call.
    fn apply(&self, change: &CountChange, sequence: &mut u64) -> Option<PresenceEvent> {
        let stats = self.registry.stats();
        ConnectionMetrics::set_totals(stats.total_connections, stats.online_users);

        let event = PresenceEvent::from_change(change)?;
        *sequence += 1;
        match &event {
            PresenceEvent::Online { user_id } => {
                PresenceMetrics::record_online();
                tracing::info!(user_id = %user_id, edge = *sequence, "User came online");
                self.dispatcher.user_online(user_id);
            }
            PresenceEvent::Offline { user_id } => {
                PresenceMetrics::record_offline();
                tracing::info!(user_id = %user_id, edge = *sequence, "User went offline");
                self.dispatcher.user_offline(user_id);
            }
        }

        // No subscribers is fine
        let _ = self.signals.send(event.clone());
        Some(event)
    }
}
