use super::ConnectionState;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("hub connection is not established")]
    NotConnected,

    #[error("cannot start a client in state '{0}'")]
    InvalidState(ConnectionState),

    #[error("invalid client options: {0}")]
    InvalidOptions(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("credential request failed: {0}")]
    Credential(String),

    #[error("malformed frame: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("invocation failed: {0}")]
    InvocationFailed(String),

    #[error("connection lost before the invocation completed")]
    ConnectionLost,

    #[error("client stopped")]
    Closed,
}
