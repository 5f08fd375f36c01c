use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A named event with positional arguments, as it travels over the hub
#[derive(Debug, Clone, PartialEq)]
pub struct HubEvent {
    pub name: String,
    pub arguments: Vec<Value>,
}

impl HubEvent {
    pub fn new(name: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// Aggregated reactions for one message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionSummary {
    pub reaction: String,
    pub count: u32,
    #[serde(default)]
    pub user_ids: Vec<String>,
}

/// Every server-originated event the chat hub emits.
///
/// Message and channel DTOs are owned by the calling business module and
/// pass through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ChatEvent {
    UserOnline {
        user_id: String,
    },
    UserOffline {
        user_id: String,
    },
    NewDirectMessage {
        message: Value,
    },
    DirectMessageEdited {
        message: Value,
    },
    DirectMessageDeleted {
        message: Value,
    },
    NewChannelMessage {
        message: Value,
    },
    ChannelMessageEdited {
        message: Value,
    },
    ChannelMessageDeleted {
        message: Value,
    },
    MessageRead {
        conversation_id: i64,
        message_id: i64,
        read_by: String,
    },
    ChannelMessagesRead {
        channel_id: i64,
        user_id: String,
        /// message id (as a JSON object key) -> updated read count
        read_counts: HashMap<String, i64>,
    },
    UserTypingInChannel {
        channel_id: i64,
        user_id: String,
        display_name: String,
        is_typing: bool,
    },
    UserTypingInConversation {
        conversation_id: i64,
        user_id: String,
        is_typing: bool,
    },
    ReactionAdded {
        channel_id: i64,
        message_id: i64,
        user_id: String,
        reaction: String,
    },
    ReactionRemoved {
        channel_id: i64,
        message_id: i64,
        user_id: String,
        reaction: String,
    },
    ChannelMessageReactionsUpdated {
        message_id: i64,
        reactions: Vec<ReactionSummary>,
    },
    AddedToChannel {
        channel: Value,
    },
    MemberLeftChannel {
        channel_id: i64,
        user_id: String,
        display_name: String,
    },
}

impl ChatEvent {
    /// Stable event name seen by clients
    pub fn name(&self) -> &'static str {
        match self {
            Self::UserOnline { .. } => "UserOnline",
            Self::UserOffline { .. } => "UserOffline",
            Self::NewDirectMessage { .. } => "NewDirectMessage",
            Self::DirectMessageEdited { .. } => "DirectMessageEdited",
            Self::DirectMessageDeleted { .. } => "DirectMessageDeleted",
            Self::NewChannelMessage { .. } => "NewChannelMessage",
            Self::ChannelMessageEdited { .. } => "ChannelMessageEdited",
            Self::ChannelMessageDeleted { .. } => "ChannelMessageDeleted",
            Self::MessageRead { .. } => "MessageRead",
            Self::ChannelMessagesRead { .. } => "ChannelMessagesRead",
            Self::UserTypingInChannel { .. } => "UserTypingInChannel",
            Self::UserTypingInConversation { .. } => "UserTypingInConversation",
            Self::ReactionAdded { .. } => "ReactionAdded",
            Self::ReactionRemoved { .. } => "ReactionRemoved",
            Self::ChannelMessageReactionsUpdated { .. } => "ChannelMessageReactionsUpdated",
            Self::AddedToChannel { .. } => "AddedToChannel",
            Self::MemberLeftChannel { .. } => "MemberLeftChannel",
        }
    }

    /// Positional arguments in wire order
    pub fn arguments(&self) -> Vec<Value> {
        match self {
            Self::UserOnline { user_id } | Self::UserOffline { user_id } => vec![json!(user_id)],
            Self::NewDirectMessage { message }
            | Self::DirectMessageEdited { message }
            | Self::DirectMessageDeleted { message }
            | Self::NewChannelMessage { message }
            | Self::ChannelMessageEdited { message }
            | Self::ChannelMessageDeleted { message } => vec![message.clone()],
            Self::MessageRead {
                conversation_id,
                message_id,
                read_by,
            } => vec![json!(conversation_id), json!(message_id), json!(read_by)],
            Self::ChannelMessagesRead {
                channel_id,
                user_id,
                read_counts,
            } => vec![json!(channel_id), json!(user_id), json!(read_counts)],
            Self::UserTypingInChannel {
                channel_id,
                user_id,
                display_name,
                is_typing,
            } => vec![
                json!(channel_id),
                json!(user_id),
                json!(display_name),
                json!(is_typing),
            ],
            Self::UserTypingInConversation {
                conversation_id,
                user_id,
                is_typing,
            } => vec![json!(conversation_id), json!(user_id), json!(is_typing)],
            Self::ReactionAdded {
                channel_id,
                message_id,
                user_id,
                reaction,
            }
            | Self::ReactionRemoved {
                channel_id,
                message_id,
                user_id,
                reaction,
            } => vec![
                json!(channel_id),
                json!(message_id),
                json!(user_id),
                json!(reaction),
            ],
            Self::ChannelMessageReactionsUpdated {
                message_id,
                reactions,
            } => vec![json!(message_id), json!(reactions)],
            Self::AddedToChannel { channel } => vec![channel.clone()],
            Self::MemberLeftChannel {
                channel_id,
                user_id,
                display_name,
            } => vec![json!(channel_id), json!(user_id), json!(display_name)],
        }
    }
}

impl From<ChatEvent> for HubEvent {
    fn from(event: ChatEvent) -> Self {
        HubEvent::new(event.name(), event.arguments())
    }
}

impl From<&ChatEvent> for HubEvent {
    fn from(event: &ChatEvent) -> Self {
        HubEvent::new(event.name(), event.arguments())
    }
}
