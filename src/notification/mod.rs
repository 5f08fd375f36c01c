//! Hub events and their delivery.
//!
//! [`ChatEvent`] enumerates everything the chat hub emits; the
//! [`NotificationDispatcher`] turns an event plus its audience into one
//! deduplicated fan-out over live connections.

mod dispatcher;
mod events;

pub use dispatcher::{DeliveryResult, DispatcherStatsSnapshot, NotificationDispatcher};
pub use events::{ChatEvent, HubEvent, ReactionSummary};
