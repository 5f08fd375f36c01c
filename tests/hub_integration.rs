//! Cross-component integration tests
//!
//! Presence, groups, the membership cache and the dispatcher wired together
//! the same way the server wires them, with in-memory connection buffers in
//! place of sockets.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::mpsc;

use chat_presence_hub::connection_manager::{
    Connection, ConnectionRegistry, GroupRegistry, TopicGroup,
};
use chat_presence_hub::hub::{ChatHub, HubMethodError, OutboundMessage, ServerMessage};
use chat_presence_hub::membership::ChannelMembershipCache;
use chat_presence_hub::notification::NotificationDispatcher;
use chat_presence_hub::presence::{PresenceCoordinator, PresenceEvent};

struct TestEnvironment {
    registry: Arc<ConnectionRegistry>,
    groups: Arc<GroupRegistry>,
    membership: Arc<ChannelMembershipCache>,
    dispatcher: Arc<NotificationDispatcher>,
    presence: Arc<PresenceCoordinator>,
    hub: ChatHub,
}

fn create_test_environment() -> TestEnvironment {
    let registry = Arc::new(ConnectionRegistry::new());
    let groups = Arc::new(GroupRegistry::new());
    let membership = Arc::new(ChannelMembershipCache::default());
    let dispatcher = Arc::new(NotificationDispatcher::new(
        registry.clone(),
        groups.clone(),
        membership.clone(),
    ));
    let presence = Arc::new(PresenceCoordinator::new(
        registry.clone(),
        groups.clone(),
        dispatcher.clone(),
    ));
    let hub = ChatHub::new(groups.clone(), presence.clone(), dispatcher.clone());

    TestEnvironment {
        registry,
        groups,
        membership,
        dispatcher,
        presence,
        hub,
    }
}

/// A connected client as the server sees it
struct TestClient {
    conn: Arc<Connection>,
    rx: mpsc::Receiver<OutboundMessage>,
}

impl TestClient {
    fn connect(env: &TestEnvironment, id: &str, user: &str) -> Self {
        let (tx, rx) = mpsc::channel(32);
        let conn = Arc::new(Connection::new(id.into(), user, tx).with_display_name(user));
        env.presence.connection_opened(conn.clone()).unwrap();
        Self { conn, rx }
    }

    /// Drain queued frames as (event name, arguments)
    fn events(&mut self) -> Vec<(String, Vec<Value>)> {
        let mut out = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            let message: ServerMessage = serde_json::from_str(&frame.to_json().unwrap()).unwrap();
            if let ServerMessage::Event { target, arguments } = message {
                out.push((target, arguments));
            }
        }
        out
    }

    fn event_names(&mut self) -> Vec<String> {
        self.events().into_iter().map(|(name, _)| name).collect()
    }
}

// =============================================================================
// Hybrid Fan-out Tests
// =============================================================================

mod fanout_tests {
    use super::*;

    #[tokio::test]
    async fn test_group_member_and_recipient_receive_once() {
        let env = create_test_environment();
        let mut h1 = TestClient::connect(&env, "h1", "alice");
        let mut h2 = TestClient::connect(&env, "h2", "alice");
        let mut h3 = TestClient::connect(&env, "h3", "bob");
        h1.events();
        h2.events();
        h3.events();

        env.hub
            .invoke(&h1.conn, "JoinChannel", vec![json!(5)])
            .unwrap();

        let result =
            env.dispatcher
                .new_channel_message(5, &["alice", "bob"], json!({"id": 1, "body": "hi"}));

        assert_eq!(result.targeted, 3);
        assert_eq!(result.delivered, 3);
        assert_eq!(h1.event_names(), vec!["NewChannelMessage"]);
        assert_eq!(h2.event_names(), vec!["NewChannelMessage"]);
        assert_eq!(h3.event_names(), vec!["NewChannelMessage"]);
    }

    #[tokio::test]
    async fn test_member_without_group_join_still_receives() {
        let env = create_test_environment();
        let mut viewer = TestClient::connect(&env, "v1", "alice");
        let mut elsewhere = TestClient::connect(&env, "e1", "bob");
        viewer.events();
        elsewhere.events();

        env.hub
            .invoke(&viewer.conn, "JoinChannel", vec![json!(9)])
            .unwrap();

        env.dispatcher
            .new_channel_message(9, &["alice", "bob"], json!({"id": 2}));

        assert_eq!(viewer.event_names(), vec!["NewChannelMessage"]);
        assert_eq!(elsewhere.event_names(), vec!["NewChannelMessage"]);
    }

    #[tokio::test]
    async fn test_group_only_listener_receives_without_being_recipient() {
        let env = create_test_environment();
        let mut lurker = TestClient::connect(&env, "l1", "carol");
        lurker.events();

        env.hub
            .invoke(&lurker.conn, "JoinConversation", vec![json!(3)])
            .unwrap();

        let result = env
            .dispatcher
            .new_direct_message(3, &["alice"], json!({"id": 10}));

        assert_eq!(result.delivered, 1);
        assert_eq!(lurker.event_names(), vec!["NewDirectMessage"]);
    }

    #[tokio::test]
    async fn test_channel_typing_uses_cached_members_and_skips_typist() {
        let env = create_test_environment();
        let mut typist = TestClient::connect(&env, "t1", "alice");
        let mut member = TestClient::connect(&env, "m1", "bob");
        let mut outsider = TestClient::connect(&env, "o1", "mallory");
        typist.events();
        member.events();
        outsider.events();

        env.membership.put(
            7,
            vec!["alice".to_string(), "bob".to_string()],
            None,
        );
        env.hub
            .invoke(&typist.conn, "JoinChannel", vec![json!(7)])
            .unwrap();
        env.hub
            .invoke(&typist.conn, "TypingInChannel", vec![json!(7), json!(true)])
            .unwrap();

        assert!(typist.events().is_empty());
        assert!(outsider.events().is_empty());
        assert_eq!(
            member.events(),
            vec![(
                "UserTypingInChannel".to_string(),
                vec![json!(7), json!("alice"), json!("alice"), json!(true)]
            )]
        );
    }

    #[tokio::test]
    async fn test_member_left_after_leave_channel() {
        let env = create_test_environment();
        let mut leaver = TestClient::connect(&env, "c1", "alice");
        let mut stayer = TestClient::connect(&env, "c2", "bob");
        leaver.events();
        stayer.events();

        env.hub
            .invoke(&leaver.conn, "JoinChannel", vec![json!(4)])
            .unwrap();
        env.hub
            .invoke(&stayer.conn, "JoinChannel", vec![json!(4)])
            .unwrap();
        env.hub
            .invoke(&leaver.conn, "LeaveChannel", vec![json!(4)])
            .unwrap();

        env.dispatcher
            .member_left_channel(4, &["bob"], "alice", "Alice");

        assert!(leaver.events().is_empty());
        assert_eq!(
            stayer.events(),
            vec![(
                "MemberLeftChannel".to_string(),
                vec![json!(4), json!("alice"), json!("Alice")]
            )]
        );
    }

    #[tokio::test]
    async fn test_dispatcher_stats_accumulate() {
        let env = create_test_environment();
        let _a = TestClient::connect(&env, "a1", "alice");
        let before = env.dispatcher.stats();

        env.dispatcher.added_to_channel("alice", json!({"id": 12}));
        env.dispatcher.added_to_channel("nobody", json!({"id": 12}));

        let after = env.dispatcher.stats();
        assert_eq!(after.total_dispatched - before.total_dispatched, 2);
        assert_eq!(after.total_delivered - before.total_delivered, 1);
    }
}

// =============================================================================
// Presence Tests
// =============================================================================

mod presence_tests {
    use super::*;

    #[tokio::test]
    async fn test_online_and_offline_broadcast_once_per_user() {
        let env = create_test_environment();
        let mut watcher = TestClient::connect(&env, "w1", "watcher");
        watcher.events();

        let phone = TestClient::connect(&env, "p1", "alice");
        let laptop = TestClient::connect(&env, "p2", "alice");
        assert_eq!(watcher.event_names(), vec!["UserOnline"]);

        env.presence.connection_closed(&phone.conn.id);
        assert!(watcher.events().is_empty());
        assert!(env.presence.is_online("alice"));

        env.presence.connection_closed(&laptop.conn.id);
        assert_eq!(
            watcher.events(),
            vec![("UserOffline".to_string(), vec![json!("alice")])]
        );
        assert!(!env.presence.is_online("alice"));
    }

    #[tokio::test]
    async fn test_presence_signal_subscription() {
        let env = create_test_environment();
        let mut signals = env.presence.subscribe();

        let client = TestClient::connect(&env, "c1", "alice");
        env.presence.connection_closed(&client.conn.id);

        assert_eq!(
            signals.recv().await.unwrap(),
            PresenceEvent::Online {
                user_id: "alice".to_string()
            }
        );
        assert_eq!(
            signals.recv().await.unwrap(),
            PresenceEvent::Offline {
                user_id: "alice".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let env = create_test_environment();
        let client = TestClient::connect(&env, "c1", "alice");

        assert!(env.presence.connection_closed(&client.conn.id).is_some());
        assert!(env.presence.connection_closed(&client.conn.id).is_none());
        assert_eq!(env.registry.stats().total_connections, 0);
    }

    #[tokio::test]
    async fn test_close_removes_group_memberships() {
        let env = create_test_environment();
        let client = TestClient::connect(&env, "c1", "alice");
        env.hub
            .invoke(&client.conn, "JoinConversation", vec![json!(8)])
            .unwrap();
        assert_eq!(env.groups.members(&TopicGroup::conversation(8)).len(), 1);

        env.presence.connection_closed(&client.conn.id);

        assert!(env.groups.members(&TopicGroup::conversation(8)).is_empty());
    }

    #[tokio::test]
    async fn test_get_online_status_through_hub() {
        let env = create_test_environment();
        let client = TestClient::connect(&env, "c1", "alice");

        let result = env
            .hub
            .invoke(
                &client.conn,
                "GetOnlineStatus",
                vec![json!(["alice", "bob"])],
            )
            .unwrap();

        assert_eq!(result, json!({"alice": true, "bob": false}));
    }
}

// =============================================================================
// Hub Invocation Tests
// =============================================================================

mod invocation_tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_method_rejected() {
        let env = create_test_environment();
        let client = TestClient::connect(&env, "c1", "alice");

        let err = env
            .hub
            .invoke(&client.conn, "DeleteEverything", vec![])
            .unwrap_err();

        assert_eq!(
            err,
            HubMethodError::UnknownMethod("DeleteEverything".to_string())
        );
    }

    #[tokio::test]
    async fn test_malformed_arguments_rejected_without_side_effects() {
        let env = create_test_environment();
        let client = TestClient::connect(&env, "c1", "alice");

        let err = env
            .hub
            .invoke(&client.conn, "JoinChannel", vec![json!("five")])
            .unwrap_err();

        assert!(matches!(err, HubMethodError::InvalidArguments { .. }));
        assert!(env.groups.groups_of(&client.conn.id).is_empty());
    }

    #[tokio::test]
    async fn test_conversation_typing_excludes_sender() {
        let env = create_test_environment();
        let mut sender = TestClient::connect(&env, "s1", "alice");
        let mut peer = TestClient::connect(&env, "p1", "bob");
        sender.events();
        peer.events();

        for client in [&sender, &peer] {
            env.hub
                .invoke(&client.conn, "JoinConversation", vec![json!(21)])
                .unwrap();
        }
        env.hub
            .invoke(
                &sender.conn,
                "TypingInConversation",
                vec![json!(21), json!(false)],
            )
            .unwrap();

        assert!(sender.events().is_empty());
        assert_eq!(
            peer.events(),
            vec![(
                "UserTypingInConversation".to_string(),
                vec![json!(21), json!("alice"), json!(false)]
            )]
        );
    }
}
