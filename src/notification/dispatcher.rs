use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::connection_manager::{
    Connection, ConnectionId, ConnectionRegistry, GroupRegistry, TopicGroup,
};
use crate::hub::{OutboundMessage, ServerMessage};
use crate::membership::ChannelMembershipCache;
use crate::metrics::DispatchMetrics;

use super::{ChatEvent, HubEvent, ReactionSummary};

/// Outcome of one fan-out
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryResult {
    pub event: String,
    /// Distinct connections the event was addressed to
    pub targeted: usize,
    /// Frames queued on a connection
    pub delivered: usize,
    /// Frames dropped on a full or closed buffer
    pub failed: usize,
}

/// Statistics for the notification dispatcher
#[derive(Debug, Default)]
pub struct DispatcherStats {
    pub total_dispatched: AtomicU64,
    pub total_delivered: AtomicU64,
    pub total_failed: AtomicU64,
    pub broadcasts: AtomicU64,
}

impl DispatcherStats {
    pub fn snapshot(&self) -> DispatcherStatsSnapshot {
        DispatcherStatsSnapshot {
            total_dispatched: self.total_dispatched.load(Ordering::Relaxed),
            total_delivered: self.total_delivered.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of dispatcher statistics
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStatsSnapshot {
    pub total_dispatched: u64,
    pub total_delivered: u64,
    pub total_failed: u64,
    pub broadcasts: u64,
}

/// Delivers hub events to topic groups and individually addressed users.
///
/// Every fan-out resolves its full target set before the first send and
/// addresses each connection at most once. Sends never wait on a slow
/// connection and are never retried.
pub struct NotificationDispatcher {
    registry: Arc<ConnectionRegistry>,
    groups: Arc<GroupRegistry>,
    membership: Arc<ChannelMembershipCache>,
    stats: DispatcherStats,
}

impl NotificationDispatcher {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        groups: Arc<GroupRegistry>,
        membership: Arc<ChannelMembershipCache>,
    ) -> Self {
        Self {
            registry,
            groups,
            membership,
            stats: DispatcherStats::default(),
        }
    }

    pub fn stats(&self) -> DispatcherStatsSnapshot {
        self.stats.snapshot()
    }

    /// Hybrid fan-out: the topic's live group plus every connection of every recipient
    #[tracing::instrument(
        name = "dispatcher.notify",
        skip(self, recipients, event),
        fields(topic = %topic, recipient_count = recipients.len())
    )]
    pub fn notify<S: AsRef<str>>(
        &self,
        topic: &TopicGroup,
        recipients: &[S],
        event: impl Into<HubEvent>,
    ) -> DeliveryResult {
        self.fan_out(Some(topic), recipients, event.into(), None)
    }

    /// Hybrid fan-out that skips every connection of `excluded_user`
    pub fn notify_except<S: AsRef<str>>(
        &self,
        topic: &TopicGroup,
        recipients: &[S],
        event: impl Into<HubEvent>,
        excluded_user: &str,
    ) -> DeliveryResult {
        self.fan_out(Some(topic), recipients, event.into(), Some(excluded_user))
    }

    /// Hybrid fan-out to a channel whose recipients come from the membership cache
    pub fn notify_channel(
        &self,
        channel_id: i64,
        event: impl Into<HubEvent>,
        excluded_user: Option<&str>,
    ) -> DeliveryResult {
        let recipients = self.membership.get(channel_id);
        self.fan_out(
            Some(&TopicGroup::channel(channel_id)),
            &recipients,
            event.into(),
            excluded_user,
        )
    }

    /// Deliver to the live members of a group only
    pub fn notify_group(
        &self,
        topic: &TopicGroup,
        event: impl Into<HubEvent>,
        excluded_user: Option<&str>,
    ) -> DeliveryResult {
        self.fan_out::<&str>(Some(topic), &[], event.into(), excluded_user)
    }

    /// Deliver to every connection of the given users only
    pub fn notify_users<S: AsRef<str>>(
        &self,
        recipients: &[S],
        event: impl Into<HubEvent>,
    ) -> DeliveryResult {
        self.fan_out(None, recipients, event.into(), None)
    }

    /// Deliver to every live connection
    #[tracing::instrument(name = "dispatcher.broadcast", skip(self, event))]
    pub fn broadcast(&self, event: impl Into<HubEvent>) -> DeliveryResult {
        let event = event.into();
        let targets = self.registry.all();
        self.stats.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.deliver(&event, &targets)
    }

    fn fan_out<S: AsRef<str>>(
        &self,
        topic: Option<&TopicGroup>,
        recipients: &[S],
        event: HubEvent,
        excluded_user: Option<&str>,
    ) -> DeliveryResult {
        let targets = self.resolve_targets(topic, recipients, excluded_user);
        self.deliver(&event, &targets)
    }

    /// Union of group members and recipient connections, deduplicated by handle
    fn resolve_targets<S: AsRef<str>>(
        &self,
        topic: Option<&TopicGroup>,
        recipients: &[S],
        excluded_user: Option<&str>,
    ) -> Vec<Arc<Connection>> {
        let mut handles: HashSet<ConnectionId> = topic
            .map(|group| self.groups.members(group))
            .unwrap_or_default();

        for user_id in recipients {
            let user_id = user_id.as_ref();
            if Some(user_id) == excluded_user {
                continue;
            }
            handles.extend(self.registry.connections_of(user_id));
        }

        // Handles may have closed since the membership snapshot; skip those
        let mut resolved: HashMap<ConnectionId, Arc<Connection>> =
            HashMap::with_capacity(handles.len());
        for handle in handles {
            if let Some(conn) = self.registry.get(&handle) {
                if excluded_user.is_some_and(|user| conn.user_id == user) {
                    continue;
                }
                resolved.insert(handle, conn);
            }
        }

        resolved.into_values().collect()
    }

    fn deliver(&self, event: &HubEvent, targets: &[Arc<Connection>]) -> DeliveryResult {
        let message = ServerMessage::event(event.name.clone(), event.arguments.clone());

        // Serialize once for the whole fan-out
        let outbound = match OutboundMessage::preserialized(&message) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::error!(error = %e, event = %event.name, "Failed to pre-serialize event, falling back to per-connection serialization");
                OutboundMessage::Raw(message)
            }
        };

        let mut delivered = 0;
        let mut failed = 0;
        for conn in targets {
            if conn.try_send(outbound.clone()) {
                delivered += 1;
            } else {
                failed += 1;
                tracing::debug!(
                    connection_id = %conn.id,
                    user_id = %conn.user_id,
                    event = %event.name,
                    "Dropped event for connection with full or closed buffer"
                );
            }
        }

        self.stats.total_dispatched.fetch_add(1, Ordering::Relaxed);
        self.stats
            .total_delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.stats
            .total_failed
            .fetch_add(failed as u64, Ordering::Relaxed);
        DispatchMetrics::record_dispatch(&event.name, targets.len(), delivered as u64, failed as u64);

        tracing::debug!(
            event = %event.name,
            targeted = targets.len(),
            delivered = delivered,
            failed = failed,
            "Event dispatched"
        );

        DeliveryResult {
            event: event.name.clone(),
            targeted: targets.len(),
            delivered,
            failed,
        }
    }

    // Presence

    pub fn user_online(&self, user_id: &str) -> DeliveryResult {
        self.broadcast(ChatEvent::UserOnline {
            user_id: user_id.to_string(),
        })
    }

    pub fn user_offline(&self, user_id: &str) -> DeliveryResult {
        self.broadcast(ChatEvent::UserOffline {
            user_id: user_id.to_string(),
        })
    }

    // Direct messages

    pub fn new_direct_message<S: AsRef<str>>(
        &self,
        conversation_id: i64,
        recipients: &[S],
        message: Value,
    ) -> DeliveryResult {
        self.notify(
            &TopicGroup::conversation(conversation_id),
            recipients,
            ChatEvent::NewDirectMessage { message },
        )
    }

    pub fn direct_message_edited<S: AsRef<str>>(
        &self,
        conversation_id: i64,
        recipients: &[S],
        message: Value,
    ) -> DeliveryResult {
        self.notify(
            &TopicGroup::conversation(conversation_id),
            recipients,
            ChatEvent::DirectMessageEdited { message },
        )
    }

    pub fn direct_message_deleted<S: AsRef<str>>(
        &self,
        conversation_id: i64,
        recipients: &[S],
        message: Value,
    ) -> DeliveryResult {
        self.notify(
            &TopicGroup::conversation(conversation_id),
            recipients,
            ChatEvent::DirectMessageDeleted { message },
        )
    }

    pub fn message_read<S: AsRef<str>>(
        &self,
        conversation_id: i64,
        recipients: &[S],
        message_id: i64,
        read_by: &str,
    ) -> DeliveryResult {
        self.notify(
            &TopicGroup::conversation(conversation_id),
            recipients,
            ChatEvent::MessageRead {
                conversation_id,
                message_id,
                read_by: read_by.to_string(),
            },
        )
    }

    // Channel messages

    pub fn new_channel_message<S: AsRef<str>>(
        &self,
        channel_id: i64,
        recipients: &[S],
        message: Value,
    ) -> DeliveryResult {
        self.notify(
            &TopicGroup::channel(channel_id),
            recipients,
            ChatEvent::NewChannelMessage { message },
        )
    }

    pub fn channel_message_edited<S: AsRef<str>>(
        &self,
        channel_id: i64,
        recipients: &[S],
        message: Value,
    ) -> DeliveryResult {
        self.notify(
            &TopicGroup::channel(channel_id),
            recipients,
            ChatEvent::ChannelMessageEdited { message },
        )
    }

    pub fn channel_message_deleted<S: AsRef<str>>(
        &self,
        channel_id: i64,
        recipients: &[S],
        message: Value,
    ) -> DeliveryResult {
        self.notify(
            &TopicGroup::channel(channel_id),
            recipients,
            ChatEvent::ChannelMessageDeleted { message },
        )
    }

    pub fn channel_messages_read<S: AsRef<str>>(
        &self,
        channel_id: i64,
        recipients: &[S],
        user_id: &str,
        read_counts: HashMap<String, i64>,
    ) -> DeliveryResult {
        self.notify(
            &TopicGroup::channel(channel_id),
            recipients,
            ChatEvent::ChannelMessagesRead {
                channel_id,
                user_id: user_id.to_string(),
                read_counts,
            },
        )
    }

    // Reactions

    pub fn reaction_added<S: AsRef<str>>(
        &self,
        channel_id: i64,
        recipients: &[S],
        message_id: i64,
        user_id: &str,
        reaction: &str,
    ) -> DeliveryResult {
        self.notify(
            &TopicGroup::channel(channel_id),
            recipients,
            ChatEvent::ReactionAdded {
                channel_id,
                message_id,
                user_id: user_id.to_string(),
                reaction: reaction.to_string(),
            },
        )
    }

    pub fn reaction_removed<S: AsRef<str>>(
        &self,
        channel_id: i64,
        recipients: &[S],
        message_id: i64,
        user_id: &str,
        reaction: &str,
    ) -> DeliveryResult {
        self.notify(
            &TopicGroup::channel(channel_id),
            recipients,
            ChatEvent::ReactionRemoved {
                channel_id,
                message_id,
                user_id: user_id.to_string(),
                reaction: reaction.to_string(),
            },
        )
    }

    pub fn reactions_updated<S: AsRef<str>>(
        &self,
        channel_id: i64,
        recipients: &[S],
        message_id: i64,
        reactions: Vec<ReactionSummary>,
    ) -> DeliveryResult {
        self.notify(
            &TopicGroup::channel(channel_id),
            recipients,
            ChatEvent::ChannelMessageReactionsUpdated {
                message_id,
                reactions,
            },
        )
    }

    // Typing

    pub fn typing_in_channel(
        &self,
        channel_id: i64,
        user_id: &str,
        display_name: &str,
        is_typing: bool,
    ) -> DeliveryResult {
        self.notify_channel(
            channel_id,
            ChatEvent::UserTypingInChannel {
                channel_id,
                user_id: user_id.to_string(),
                display_name: display_name.to_string(),
                is_typing,
            },
            Some(user_id),
        )
    }

    pub fn typing_in_conversation(
        &self,
        conversation_id: i64,
        user_id: &str,
        is_typing: bool,
    ) -> DeliveryResult {
        self.notify_group(
            &TopicGroup::conversation(conversation_id),
            ChatEvent::UserTypingInConversation {
                conversation_id,
                user_id: user_id.to_string(),
                is_typing,
            },
            Some(user_id),
        )
    }

    // Membership

    /// Tell a newly added member about the channel; they have not joined its group yet
    pub fn added_to_channel(&self, user_id: &str, channel: Value) -> DeliveryResult {
        self.notify_users(&[user_id], ChatEvent::AddedToChannel { channel })
    }

    pub fn member_left_channel<S: AsRef<str>>(
        &self,
        channel_id: i64,
        recipients: &[S],
        user_id: &str,
        display_name: &str,
    ) -> DeliveryResult {
        self.notify(
            &TopicGroup::channel(channel_id),
            recipients,
            ChatEvent::MemberLeftChannel {
                channel_id,
                user_id: user_id.to_string(),
                display_name: display_name.to_string(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::ServerMessage;
    use serde_json::json;
    use tokio::sync::mpsc;

    struct Fixture {
        registry: Arc<ConnectionRegistry>,
        groups: Arc<GroupRegistry>,
        membership: Arc<ChannelMembershipCache>,
        dispatcher: NotificationDispatcher,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(ConnectionRegistry::new());
        let groups = Arc::new(GroupRegistry::new());
        let membership = Arc::new(ChannelMembershipCache::default());
        let dispatcher =
            NotificationDispatcher::new(registry.clone(), groups.clone(), membership.clone());
        Fixture {
            registry,
            groups,
            membership,
            dispatcher,
        }
    }

    fn connect(
        registry: &ConnectionRegistry,
        id: &str,
        user: &str,
    ) -> mpsc::Receiver<OutboundMessage> {
        let (tx, rx) = mpsc::channel(16);
        registry
            .add(Arc::new(Connection::new(ConnectionId::from(id), user, tx)))
            .unwrap();
        rx
    }

    fn drain(rx: &mut mpsc::Receiver<OutboundMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            let text = msg.to_json().unwrap();
            out.push(serde_json::from_str(&text).unwrap());
        }
        out
    }

    #[test]
    fn test_hybrid_fanout_deduplicates() {
        let f = fixture();
        let mut h1 = connect(&f.registry, "h1", "userX");
        let mut h2 = connect(&f.registry, "h2", "userX");
        let mut h3 = connect(&f.registry, "h3", "userY");

        let group = TopicGroup::channel(5);
        f.groups.join(&"h1".into(), &group);
        f.groups.join(&"h3".into(), &group);

        let result = f.dispatcher.notify(
            &group,
            &["userX"],
            HubEvent::new("NewChannelMessage", vec![json!({"id": 1})]),
        );

        assert_eq!(result.targeted, 3);
        assert_eq!(result.delivered, 3);
        assert_eq!(drain(&mut h1).len(), 1);
        assert_eq!(drain(&mut h2).len(), 1);
        assert_eq!(drain(&mut h3).len(), 1);
    }

    #[test]
    fn test_lazy_joiner_receives_event() {
        let f = fixture();
        let mut rx = connect(&f.registry, "c1", "bob");

        let result = f
            .dispatcher
            .new_direct_message(42, &["bob"], json!({"text": "hi"}));

        assert_eq!(result.delivered, 1);
        let messages = drain(&mut rx);
        assert_eq!(
            messages,
            vec![ServerMessage::event("NewDirectMessage", vec![json!({"text": "hi"})])]
        );
    }

    #[test]
    fn test_offline_recipient_is_skipped() {
        let f = fixture();
        let result = f.dispatcher.notify_users(&["ghost"], HubEvent::new("X", vec![]));
        assert_eq!(result.targeted, 0);
        assert_eq!(result.delivered, 0);
    }

    #[test]
    fn test_broadcast_reaches_everyone() {
        let f = fixture();
        let mut a = connect(&f.registry, "a", "alice");
        let mut b = connect(&f.registry, "b", "bob");

        let result = f.dispatcher.user_online("carol");

        assert_eq!(result.delivered, 2);
        assert_eq!(drain(&mut a), vec![ServerMessage::event("UserOnline", vec![json!("carol")])]);
        assert_eq!(drain(&mut b).len(), 1);
        assert_eq!(f.dispatcher.stats().broadcasts, 1);
    }

    #[test]
    fn test_channel_typing_uses_cache_and_skips_typist() {
        let f = fixture();
        let mut typist = connect(&f.registry, "t1", "alice");
        let mut member = connect(&f.registry, "m1", "bob");
        let mut joined = connect(&f.registry, "j1", "carol");
        f.groups.join(&"t1".into(), &TopicGroup::channel(8));
        f.groups.join(&"j1".into(), &TopicGroup::channel(8));
        f.membership
            .put(8, vec!["alice".into(), "bob".into(), "carol".into()], None);

        let result = f.dispatcher.typing_in_channel(8, "alice", "Alice", true);

        assert_eq!(result.delivered, 2);
        assert!(drain(&mut typist).is_empty());
        assert_eq!(drain(&mut member).len(), 1);
        assert_eq!(drain(&mut joined).len(), 1);
    }

    #[test]
    fn test_expired_cache_falls_back_to_group() {
        let f = fixture();
        let mut joined = connect(&f.registry, "j1", "carol");
        let mut lazy = connect(&f.registry, "l1", "dave");
        f.groups.join(&"j1".into(), &TopicGroup::channel(3));

        let result = f
            .dispatcher
            .notify_channel(3, HubEvent::new("NewChannelMessage", vec![]), None);

        assert_eq!(result.delivered, 1);
        assert_eq!(drain(&mut joined).len(), 1);
        assert!(drain(&mut lazy).is_empty());
    }

    #[test]
    fn test_full_buffer_counts_as_failed() {
        let f = fixture();
        let (tx, _rx) = mpsc::channel(1);
        f.registry
            .add(Arc::new(Connection::new("c1".into(), "alice", tx)))
            .unwrap();

        let first = f.dispatcher.notify_users(&["alice"], HubEvent::new("A", vec![]));
        let second = f.dispatcher.notify_users(&["alice"], HubEvent::new("B", vec![]));

        assert_eq!(first.delivered, 1);
        assert_eq!(second.failed, 1);
    }
}
