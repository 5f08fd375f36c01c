use std::collections::HashSet;
use std::fmt;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::stats::GroupStats;
use super::types::ConnectionId;

/// Name of a topic group a connection can subscribe to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicGroup(String);

impl TopicGroup {
    pub fn channel(channel_id: i64) -> Self {
        Self(format!("channel_{}", channel_id))
    }

    pub fn conversation(conversation_id: i64) -> Self {
        Self(format!("conversation_{}", conversation_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopicGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Live topic group membership, keyed both ways so a closing connection
/// leaves all of its groups without scanning every group.
pub struct GroupRegistry {
    /// group -> Set<connection_id>
    groups: DashMap<TopicGroup, HashSet<ConnectionId>>,
    /// connection_id -> Set<group>
    memberships: DashMap<ConnectionId, HashSet<TopicGroup>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self {
            groups: DashMap::new(),
            memberships: DashMap::new(),
        }
    }

    /// Add a connection to a group. Joining twice is a no-op.
    pub fn join(&self, connection_id: &ConnectionId, group: &TopicGroup) {
        let mut joined = self.memberships.entry(connection_id.clone()).or_default();
        joined.insert(group.clone());

        self.groups
            .entry(group.clone())
            .or_default()
            .insert(connection_id.clone());

        tracing::debug!(connection_id = %connection_id, group = %group, "Joined group");
    }

    /// Remove a connection from a group. Leaving a group not joined is a no-op.
    pub fn leave(&self, connection_id: &ConnectionId, group: &TopicGroup) {
        if let Some(mut joined) = self.memberships.get_mut(connection_id) {
            joined.remove(group);
            if joined.is_empty() {
                drop(joined);
                self.memberships.remove_if(connection_id, |_, groups| groups.is_empty());
            }
        }

        if let Some(mut members) = self.groups.get_mut(group) {
            members.remove(connection_id);
            if members.is_empty() {
                drop(members);
                self.groups.remove_if(group, |_, members| members.is_empty());
            }
        }

        tracing::debug!(connection_id = %connection_id, group = %group, "Left group");
    }

    /// Drop a closed connection from every group it had joined
    pub fn remove_connection(&self, connection_id: &ConnectionId) {
        let Some((_, joined)) = self.memberships.remove(connection_id) else {
            return;
        };

        for group in joined {
            if let Some(mut members) = self.groups.get_mut(&group) {
                members.remove(connection_id);
                if members.is_empty() {
                    drop(members);
                    self.groups.remove_if(&group, |_, members| members.is_empty());
                }
            }
        }
    }

    /// Snapshot of a group's current members
    pub fn members(&self, group: &TopicGroup) -> HashSet<ConnectionId> {
        self.groups
            .get(group)
            .map(|members| members.clone())
            .unwrap_or_default()
    }

    pub fn groups_of(&self, connection_id: &ConnectionId) -> HashSet<TopicGroup> {
        self.memberships
            .get(connection_id)
            .map(|groups| groups.clone())
            .unwrap_or_default()
    }

    pub fn stats(&self) -> GroupStats {
        GroupStats {
            total_groups: self.groups.len(),
            members: self
                .groups
                .iter()
                .map(|entry| (entry.key().to_string(), entry.value().len()))
                .collect(),
        }
    }
}

impl Default for GroupRegistry {
    fn default() -> Self {
        Self::new()
    }
}
