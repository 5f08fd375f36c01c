//! The chat hub: wire frames, the WebSocket endpoint and invocable methods.

mod handler;
mod message;
mod methods;

pub use handler::hub_handler;
pub use message::{ClientMessage, OutboundMessage, ServerMessage};
pub use methods::{ChatHub, HubMethod, HubMethodError};
