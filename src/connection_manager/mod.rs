//! Server-side connection bookkeeping.
//!
//! - `registry`: connection handle ↔ user id, with per-user handle sets
//! - `groups`: topic group membership (`channel_<id>`, `conversation_<id>`)

mod groups;
mod registry;
mod stats;
mod types;

pub use groups::{GroupRegistry, TopicGroup};
pub use registry::ConnectionRegistry;
pub use stats::{GroupStats, RegistryStats};
pub use types::{Connection, ConnectionId, CountChange, RegistryError};
