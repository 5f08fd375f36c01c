// Shared infrastructure
pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;

// Presence and fan-out core
pub mod connection_manager;
pub mod membership;
pub mod notification;
pub mod presence;

// Server surface
pub mod api;
pub mod hub;
pub mod server;

// Hub client
pub mod client;
pub mod retry;

// Supporting modules
pub mod shutdown;
pub mod tasks;
pub mod telemetry;
