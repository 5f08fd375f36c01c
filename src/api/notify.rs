//! Internal trigger used by business write paths after a successful commit.

use axum::{extract::State, Json};
use serde::Deserialize;

use crate::connection_manager::TopicGroup;
use crate::error::{AppError, Result};
use crate::notification::{ChatEvent, DeliveryResult};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct NotifyRequest {
    /// Topic group to reach; omitted means recipients only
    #[serde(default)]
    pub topic: Option<TopicGroup>,
    #[serde(default)]
    pub recipients: Vec<String>,
    /// Skip every connection of this user
    #[serde(default)]
    pub exclude_user: Option<String>,
    pub event: ChatEvent,
}

/// POST /api/v1/notify
#[tracing::instrument(
    name = "api.notify",
    skip(state, request),
    fields(event = request.event.name(), recipient_count = request.recipients.len())
)]
pub async fn notify(
    State(state): State<AppState>,
    Json(request): Json<NotifyRequest>,
) -> Result<Json<DeliveryResult>> {
    if request.topic.is_none() && request.recipients.is_empty() {
        return Err(AppError::Validation(
            "either topic or recipients is required".to_string(),
        ));
    }

    let dispatcher = &state.dispatcher;
    let result = match (&request.topic, request.exclude_user.as_deref()) {
        (Some(topic), Some(excluded)) => {
            dispatcher.notify_except(topic, &request.recipients, &request.event, excluded)
        }
        (Some(topic), None) => dispatcher.notify(topic, &request.recipients, &request.event),
        (None, _) => {
            let recipients: Vec<&str> = request
                .recipients
                .iter()
                .map(String::as_str)
                .filter(|user| Some(*user) != request.exclude_user.as_deref())
                .collect();
            dispatcher.notify_users(&recipients, &request.event)
        }
    };

    Ok(Json(result))
}
