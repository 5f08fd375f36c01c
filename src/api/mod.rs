//! HTTP endpoints alongside the hub.

mod health;
mod hub_token;
mod membership;
mod metrics;
mod notify;
mod routes;

pub use health::{health, stats};
pub use hub_token::{hub_token, HubTokenResponse};
pub use membership::{invalidate_members, put_members, PutMembersRequest};
pub use metrics::prometheus_metrics;
pub use notify::{notify, NotifyRequest};
pub use routes::api_routes;
