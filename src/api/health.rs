//! Health check and statistics endpoints.

use std::collections::HashMap;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::notification::DispatcherStatsSnapshot;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub connections: usize,
    pub online_users: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub connections: ConnectionStats,
    pub groups: GroupStatsResponse,
    pub cached_channels: usize,
    pub notifications: DispatcherStatsSnapshot,
}

#[derive(Debug, Serialize)]
pub struct ConnectionStats {
    pub total_connections: usize,
    pub online_users: usize,
}

#[derive(Debug, Serialize)]
pub struct GroupStatsResponse {
    pub total_groups: usize,
    pub members: HashMap<String, usize>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let registry = state.registry.stats();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        connections: registry.total_connections,
        online_users: registry.online_users,
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let registry = state.registry.stats();
    let groups = state.groups.stats();

    Json(StatsResponse {
        connections: ConnectionStats {
            total_connections: registry.total_connections,
            online_users: registry.online_users,
        },
        groups: GroupStatsResponse {
            total_groups: groups.total_groups,
            members: groups.members,
        },
        cached_channels: state.membership.len(),
        notifications: state.dispatcher.stats(),
    })
}
