//! Connection handle and related types

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

use crate::hub::{OutboundMessage, ServerMessage};

/// Opaque token identifying one live transport connection
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Arc<str>);

impl ConnectionId {
    /// Assign a fresh handle at negotiation time
    pub fn generate() -> Self {
        Self(Arc::from(Uuid::new_v4().simple().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self(Arc::from(value))
    }
}

impl From<String> for ConnectionId {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A live hub connection owned by the registry
pub struct Connection {
    pub id: ConnectionId,
    pub user_id: String,
    pub display_name: String,
    pub device: Option<String>,
    pub connected_at: DateTime<Utc>,
    sender: mpsc::Sender<OutboundMessage>,
    /// Last activity timestamp (Unix seconds)
    last_activity: AtomicI64,
    closed: Notify,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        user_id: impl Into<String>,
        sender: mpsc::Sender<OutboundMessage>,
    ) -> Self {
        let user_id = user_id.into();
        let now = Utc::now();
        Self {
            id,
            display_name: user_id.clone(),
            user_id,
            device: None,
            connected_at: now,
            sender,
            last_activity: AtomicI64::new(now.timestamp()),
            closed: Notify::new(),
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn with_device(mut self, device: Option<String>) -> Self {
        self.device = device;
        self
    }

    pub fn update_activity(&self) {
        self.last_activity
            .store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.last_activity.load(Ordering::Relaxed), 0)
            .unwrap_or_else(Utc::now)
    }

    /// Queue a message without waiting for buffer space.
    ///
    /// Sends are best-effort: a full or closed buffer drops the frame.
    pub fn try_send(&self, message: OutboundMessage) -> bool {
        self.sender.try_send(message).is_ok()
    }

    pub async fn send(
        &self,
        message: ServerMessage,
    ) -> Result<(), mpsc::error::SendError<OutboundMessage>> {
        self.sender.send(OutboundMessage::Raw(message)).await
    }

    /// Ask the transport task owning this connection to close it
    pub fn close(&self) {
        self.closed.notify_one();
    }

    /// Resolves once `close` has been requested
    pub async fn closed(&self) {
        self.closed.notified().await
    }

    #[cfg(test)]
    pub(crate) fn set_last_activity(&self, at: DateTime<Utc>) {
        self.last_activity.store(at.timestamp(), Ordering::Relaxed);
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("device", &self.device)
            .field("connected_at", &self.connected_at)
            .finish()
    }
}

/// Outcome of a registry mutation for one user, observed under that user's lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountChange {
    pub user_id: String,
    pub previous: usize,
    pub current: usize,
}

impl CountChange {
    pub fn is_unchanged(&self) -> bool {
        self.previous == self.current
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("connection handle {handle} already belongs to user {existing_user}, refusing to reassign it to {requested_user}")]
    HandleReuse {
        handle: ConnectionId,
        existing_user: String,
        requested_user: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_serializes_as_plain_string() {
        let id = ConnectionId::from("abc123");

        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abc123\"");

        let parsed: ConnectionId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }
}
