//! Prometheus metrics for the presence hub.
//!
//! - Connection metrics (live connections, online users)
//! - Presence transitions
//! - Fan-out metrics (events dispatched, per-connection deliveries)
//! - Hub invocations from clients
//! - Membership cache hit rate
//! - Heartbeat round timing and evictions

mod helpers;

pub use helpers::{
    encode_metrics, CacheMetrics, ConnectionMetrics, DispatchMetrics, HeartbeatMetrics,
    InvocationMetrics, PresenceMetrics,
};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "hub";

lazy_static! {
    /// Total number of live hub connections
    pub static ref CONNECTIONS_TOTAL: IntGauge = register_int_gauge!(
        format!("{}_connections_total", METRIC_PREFIX),
        "Total number of live hub connections"
    ).unwrap();

    /// Number of users with at least one live connection
    pub static ref USERS_ONLINE: IntGauge = register_int_gauge!(
        format!("{}_users_online", METRIC_PREFIX),
        "Number of users with at least one live connection"
    ).unwrap();

    /// Presence edges by direction
    pub static ref PRESENCE_TRANSITIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_presence_transitions_total", METRIC_PREFIX),
        "Presence transitions crossing zero connections",
        &["direction"]
    ).unwrap();

    /// Events dispatched, by event name
    pub static ref EVENTS_DISPATCHED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_events_dispatched_total", METRIC_PREFIX),
        "Events handed to the dispatcher",
        &["event"]
    ).unwrap();

    /// Frames queued on a connection
    pub static ref MESSAGES_DELIVERED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_messages_delivered_total", METRIC_PREFIX),
        "Frames queued for delivery to connections"
    ).unwrap();

    /// Frames dropped because the connection buffer was full or closed
    pub static ref MESSAGES_FAILED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_messages_failed_total", METRIC_PREFIX),
        "Frames dropped on full or closed connection buffers"
    ).unwrap();

    /// Connections reached per dispatch
    pub static ref FANOUT_SIZE: Histogram = register_histogram!(
        format!("{}_fanout_size", METRIC_PREFIX),
        "Distinct connections reached per dispatch",
        vec![0.0, 1.0, 2.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0]
    ).unwrap();

    /// Client invocations by method and outcome
    pub static ref INVOCATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_invocations_total", METRIC_PREFIX),
        "Hub method invocations from clients",
        &["method", "outcome"]
    ).unwrap();

    /// Membership cache lookups by result
    pub static ref MEMBERSHIP_CACHE_LOOKUPS: IntCounterVec = register_int_counter_vec!(
        format!("{}_membership_cache_lookups_total", METRIC_PREFIX),
        "Channel membership cache lookups",
        &["result"]
    ).unwrap();

    /// Heartbeat round duration in milliseconds
    pub static ref HEARTBEAT_DURATION_MS: Histogram = register_histogram!(
        format!("{}_heartbeat_duration_ms", METRIC_PREFIX),
        "Duration of a keep-alive round in milliseconds",
        vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0]
    ).unwrap();

    /// Connections evicted for silence
    pub static ref HEARTBEAT_EVICTIONS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_heartbeat_evictions_total", METRIC_PREFIX),
        "Connections dropped after exceeding the client timeout"
    ).unwrap();
}
