use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Call a hub method. Without an invocation id the call is fire-and-forget.
    #[serde(rename_all = "camelCase")]
    Invocation {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        invocation_id: Option<String>,
        target: String,
        #[serde(default)]
        arguments: Vec<Value>,
    },
    Ping,
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Named event with positional arguments
    Event { target: String, arguments: Vec<Value> },
    /// Result of an invocation
    #[serde(rename_all = "camelCase")]
    Completion {
        invocation_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Ping,
    /// Server-initiated close
    Close {
        #[serde(default)]
        error: Option<String>,
    },
}

impl ServerMessage {
    pub fn event(target: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self::Event {
            target: target.into(),
            arguments,
        }
    }

    pub fn completion(invocation_id: impl Into<String>, result: Value) -> Self {
        Self::Completion {
            invocation_id: invocation_id.into(),
            result: Some(result),
            error: None,
        }
    }

    pub fn completion_error(invocation_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Completion {
            invocation_id: invocation_id.into(),
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn close(error: Option<String>) -> Self {
        Self::Close { error }
    }
}

/// Outbound frame queued for a connection's writer task.
///
/// Fan-out serializes an event once and shares the text across every
/// connection instead of serializing per send.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    Raw(ServerMessage),
    Preserialized(Arc<str>),
}

impl OutboundMessage {
    pub fn preserialized(message: &ServerMessage) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_string(message)?;
        Ok(Self::Preserialized(Arc::from(json)))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::Raw(message) => serde_json::to_string(message),
            Self::Preserialized(text) => Ok(text.to_string()),
        }
    }

    /// Whether this frame closes the connection once written
    pub fn is_close(&self) -> bool {
        matches!(self, Self::Raw(ServerMessage::Close { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_invocation_wire_shape() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "invocation",
            "invocationId": "3",
            "target": "JoinChannel",
            "arguments": [5]
        }))
        .unwrap();

        assert_eq!(
            msg,
            ClientMessage::Invocation {
                invocation_id: Some("3".to_string()),
                target: "JoinChannel".to_string(),
                arguments: vec![json!(5)],
            }
        );
    }

    #[test]
    fn test_fire_and_forget_invocation_omits_id() {
        let msg = ClientMessage::Invocation {
            invocation_id: None,
            target: "TypingInChannel".to_string(),
            arguments: vec![json!(1), json!(true)],
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert!(value.get("invocationId").is_none());
        assert_eq!(value["type"], "invocation");
    }

    #[test]
    fn test_event_wire_shape() {
        let value = serde_json::to_value(ServerMessage::event("UserOnline", vec![json!("u1")])).unwrap();
        assert_eq!(
            value,
            json!({"type": "event", "target": "UserOnline", "arguments": ["u1"]})
        );
    }

    #[test]
    fn test_completion_error_wire_shape() {
        let value = serde_json::to_value(ServerMessage::completion_error("9", "boom")).unwrap();
        assert_eq!(
            value,
            json!({"type": "completion", "invocationId": "9", "error": "boom"})
        );
    }

    #[test]
    fn test_preserialized_matches_raw() {
        let message = ServerMessage::event("UserOffline", vec![json!("u2")]);
        let raw = OutboundMessage::Raw(message.clone()).to_json().unwrap();
        let pre = OutboundMessage::preserialized(&message).unwrap().to_json().unwrap();
        assert_eq!(raw, pre);
    }
}
