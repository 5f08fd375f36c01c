//! Resilient hub client.
//!
//! Keeps one logical connection to the presence hub alive across network
//! drops, refreshes its short-lived credential in the background and routes
//! server events to typed handlers.

mod credential;
mod error;
mod handlers;
mod hub_client;
mod options;
mod state;
mod transport;

pub use credential::{CredentialCache, CredentialProvider, HttpCredentialProvider};
pub use error::ClientError;
pub use handlers::{HandlerTable, LifecycleCallbacks};
pub use hub_client::ResilientHubClient;
pub use options::{
    ClientOptions, DEFAULT_CREDENTIAL_LIFETIME, DEFAULT_CREDENTIAL_REFRESH,
    DEFAULT_KEEP_ALIVE_INTERVAL, DEFAULT_SERVER_TIMEOUT,
};
pub use state::ConnectionState;
pub use transport::{HubTransport, TransportConnection, WebSocketTransport};
