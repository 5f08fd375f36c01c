use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::server::{api_key_auth, AppState};

use super::health::{health, stats};
use super::hub_token::hub_token;
use super::membership::{invalidate_members, put_members};
use super::metrics::prometheus_metrics;
use super::notify::notify;

pub fn api_routes(state: AppState) -> Router<AppState> {
    let internal = Router::new()
        .route("/notify", post(notify))
        .route(
            "/channels/{channel_id}/members",
            put(put_members).delete(invalidate_members),
        )
        .route_layer(middleware::from_fn_with_state(state, api_key_auth));

    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
        .route("/api/auth/hub-token", get(hub_token))
        .nest("/api/v1", internal)
}
