//! Channel membership snapshot endpoints.

use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct PutMembersRequest {
    pub members: Vec<String>,
    /// Overrides the configured snapshot lifetime
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
}

/// PUT /api/v1/channels/{channel_id}/members
pub async fn put_members(
    State(state): State<AppState>,
    Path(channel_id): Path<i64>,
    Json(request): Json<PutMembersRequest>,
) -> StatusCode {
    state.membership.put(
        channel_id,
        request.members,
        request.ttl_seconds.map(Duration::from_secs),
    );
    StatusCode::NO_CONTENT
}

/// DELETE /api/v1/channels/{channel_id}/members
pub async fn invalidate_members(
    State(state): State<AppState>,
    Path(channel_id): Path<i64>,
) -> StatusCode {
    state.membership.invalidate(channel_id);
    StatusCode::NO_CONTENT
}
