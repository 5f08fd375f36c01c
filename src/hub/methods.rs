//! Server methods a connected client can invoke.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::connection_manager::{Connection, GroupRegistry, TopicGroup};
use crate::metrics::InvocationMetrics;
use crate::notification::NotificationDispatcher;
use crate::presence::PresenceCoordinator;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HubMethodError {
    #[error("unknown hub method '{0}'")]
    UnknownMethod(String),

    #[error("invalid arguments for '{method}': {reason}")]
    InvalidArguments { method: String, reason: String },
}

/// A decoded invocation
#[derive(Debug, Clone, PartialEq)]
pub enum HubMethod {
    JoinChannel(i64),
    LeaveChannel(i64),
    JoinConversation(i64),
    LeaveConversation(i64),
    TypingInChannel { channel_id: i64, is_typing: bool },
    TypingInConversation { conversation_id: i64, is_typing: bool },
    GetOnlineStatus(Vec<String>),
}

impl HubMethod {
    /// Decode a method name and its positional arguments
    pub fn parse(target: &str, arguments: Vec<Value>) -> Result<Self, HubMethodError> {
        let method = match target {
            "JoinChannel" => Self::JoinChannel(decode::<(i64,)>(target, arguments)?.0),
            "LeaveChannel" => Self::LeaveChannel(decode::<(i64,)>(target, arguments)?.0),
            "JoinConversation" => Self::JoinConversation(decode::<(i64,)>(target, arguments)?.0),
            "LeaveConversation" => {
                Self::LeaveConversation(decode::<(i64,)>(target, arguments)?.0)
            }
            "TypingInChannel" => {
                let (channel_id, is_typing) = decode::<(i64, bool)>(target, arguments)?;
                Self::TypingInChannel {
                    channel_id,
                    is_typing,
                }
            }
            "TypingInConversation" => {
                let (conversation_id, is_typing) = decode::<(i64, bool)>(target, arguments)?;
                Self::TypingInConversation {
                    conversation_id,
                    is_typing,
                }
            }
            "GetOnlineStatus" => {
                Self::GetOnlineStatus(decode::<(Vec<String>,)>(target, arguments)?.0)
            }
            other => return Err(HubMethodError::UnknownMethod(other.to_string())),
        };
        Ok(method)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinChannel(_) => "JoinChannel",
            Self::LeaveChannel(_) => "LeaveChannel",
            Self::JoinConversation(_) => "JoinConversation",
            Self::LeaveConversation(_) => "LeaveConversation",
            Self::TypingInChannel { .. } => "TypingInChannel",
            Self::TypingInConversation { .. } => "TypingInConversation",
            Self::GetOnlineStatus(_) => "GetOnlineStatus",
        }
    }
}

fn decode<T: DeserializeOwned>(method: &str, arguments: Vec<Value>) -> Result<T, HubMethodError> {
    serde_json::from_value(Value::Array(arguments)).map_err(|e| HubMethodError::InvalidArguments {
        method: method.to_string(),
        reason: e.to_string(),
    })
}

/// The chat hub: executes client invocations against groups, presence and fan-out
pub struct ChatHub {
    groups: Arc<GroupRegistry>,
    presence: Arc<PresenceCoordinator>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl ChatHub {
    pub fn new(
        groups: Arc<GroupRegistry>,
        presence: Arc<PresenceCoordinator>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            groups,
            presence,
            dispatcher,
        }
    }

    /// Run one invocation for `caller`, returning the completion result
    #[tracing::instrument(
        name = "hub.invoke",
        skip(self, caller, arguments),
        fields(connection_id = %caller.id, user_id = %caller.user_id)
    )]
    pub fn invoke(
        &self,
        caller: &Connection,
        target: &str,
        arguments: Vec<Value>,
    ) -> Result<Value, HubMethodError> {
        let method = match HubMethod::parse(target, arguments) {
            Ok(method) => method,
            Err(e) => {
                InvocationMetrics::record_error(target);
                tracing::warn!(method = %target, error = %e, "Rejected hub invocation");
                return Err(e);
            }
        };

        let result = self.execute(caller, &method);
        InvocationMetrics::record_ok(method.name());
        Ok(result)
    }

    fn execute(&self, caller: &Connection, method: &HubMethod) -> Value {
        match method {
            HubMethod::JoinChannel(channel_id) => {
                self.groups.join(&caller.id, &TopicGroup::channel(*channel_id));
                Value::Null
            }
            HubMethod::LeaveChannel(channel_id) => {
                self.groups.leave(&caller.id, &TopicGroup::channel(*channel_id));
                Value::Null
            }
            HubMethod::JoinConversation(conversation_id) => {
                self.groups
                    .join(&caller.id, &TopicGroup::conversation(*conversation_id));
                Value::Null
            }
            HubMethod::LeaveConversation(conversation_id) => {
                self.groups
                    .leave(&caller.id, &TopicGroup::conversation(*conversation_id));
                Value::Null
            }
            HubMethod::TypingInChannel {
                channel_id,
                is_typing,
            } => {
                self.dispatcher.typing_in_channel(
                    *channel_id,
                    &caller.user_id,
                    &caller.display_name,
                    *is_typing,
                );
                Value::Null
            }
            HubMethod::TypingInConversation {
                conversation_id,
                is_typing,
            } => {
                self.dispatcher
                    .typing_in_conversation(*conversation_id, &caller.user_id, *is_typing);
                Value::Null
            }
            HubMethod::GetOnlineStatus(user_ids) => {
                serde_json::json!(self.presence.bulk_status(user_ids))
            }
        }
    }
}
