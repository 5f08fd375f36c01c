//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    CONNECTIONS_TOTAL, EVENTS_DISPATCHED_TOTAL, FANOUT_SIZE, HEARTBEAT_DURATION_MS,
    HEARTBEAT_EVICTIONS_TOTAL, INVOCATIONS_TOTAL, MEMBERSHIP_CACHE_LOOKUPS,
    MESSAGES_DELIVERED_TOTAL, MESSAGES_FAILED_TOTAL, PRESENCE_TRANSITIONS_TOTAL, USERS_ONLINE,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

pub struct ConnectionMetrics;

impl ConnectionMetrics {
    pub fn set_totals(connections: usize, online_users: usize) {
        CONNECTIONS_TOTAL.set(connections as i64);
        USERS_ONLINE.set(online_users as i64);
    }
}

pub struct PresenceMetrics;

impl PresenceMetrics {
    pub fn record_online() {
        PRESENCE_TRANSITIONS_TOTAL.with_label_values(&["online"]).inc();
    }

    pub fn record_offline() {
        PRESENCE_TRANSITIONS_TOTAL.with_label_values(&["offline"]).inc();
    }
}

/// Helper struct for recording fan-out metrics
pub struct DispatchMetrics;

impl DispatchMetrics {
    pub fn record_dispatch(event: &str, fanout: usize, delivered: u64, failed: u64) {
        EVENTS_DISPATCHED_TOTAL.with_label_values(&[event]).inc();
        FANOUT_SIZE.observe(fanout as f64);
        MESSAGES_DELIVERED_TOTAL.inc_by(delivered);
        MESSAGES_FAILED_TOTAL.inc_by(failed);
    }
}

pub struct InvocationMetrics;

impl InvocationMetrics {
    pub fn record_ok(method: &str) {
        INVOCATIONS_TOTAL.with_label_values(&[method, "ok"]).inc();
    }

    pub fn record_error(method: &str) {
        INVOCATIONS_TOTAL.with_label_values(&[method, "error"]).inc();
    }
}

pub struct CacheMetrics;

impl CacheMetrics {
    pub fn record_hit() {
        MEMBERSHIP_CACHE_LOOKUPS.with_label_values(&["hit"]).inc();
    }

    pub fn record_miss() {
        MEMBERSHIP_CACHE_LOOKUPS.with_label_values(&["miss"]).inc();
    }
}

pub struct HeartbeatMetrics;

impl HeartbeatMetrics {
    pub fn record_duration_ms(ms: u64) {
        HEARTBEAT_DURATION_MS.observe(ms as f64);
    }

    pub fn record_evictions(count: u64) {
        HEARTBEAT_EVICTIONS_TOTAL.inc_by(count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_contains_recorded_metrics() {
        PresenceMetrics::record_online();
        DispatchMetrics::record_dispatch("UserOnline", 2, 2, 0);

        let text = encode_metrics().unwrap();
        assert!(text.contains("hub_presence_transitions_total"));
        assert!(text.contains("hub_events_dispatched_total"));
    }
}
