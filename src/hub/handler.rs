use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::auth::Claims;
use crate::connection_manager::{Connection, ConnectionId};
use crate::server::AppState;

use super::message::{ClientMessage, OutboundMessage, ServerMessage};

#[derive(Debug, Deserialize)]
pub struct HubQuery {
    pub access_token: Option<String>,
}

/// Hub WebSocket upgrade handler
#[tracing::instrument(
    name = "hub.upgrade",
    skip(ws, state, query, headers),
    fields(has_query_token = query.access_token.is_some())
)]
pub async fn hub_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<HubQuery>,
    headers: HeaderMap,
) -> Response {
    let Some(token) = extract_token(&query, &headers) else {
        return (StatusCode::UNAUTHORIZED, "Missing hub credential").into_response();
    };

    let claims = match state.jwt_validator.validate_hub_credential(&token) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::warn!(error = %e, "Hub credential rejected");
            return (StatusCode::UNAUTHORIZED, "Invalid hub credential").into_response();
        }
    };

    tracing::info!(user_id = %claims.sub, "Hub connection requested");

    ws.on_upgrade(move |socket| handle_socket(socket, state, claims))
}

/// Bearer header first, `access_token` query parameter as fallback
fn extract_token(query: &HubQuery, headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    query.access_token.clone()
}

#[tracing::instrument(
    name = "hub.connection",
    skip(socket, state, claims),
    fields(user_id = %claims.sub, otel.kind = "server")
)]
async fn handle_socket(socket: WebSocket, state: AppState, claims: Claims) {
    let connection_start = std::time::Instant::now();
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(state.settings.hub.send_buffer);

    let connection = Arc::new(
        Connection::new(ConnectionId::generate(), claims.user_id(), tx)
            .with_display_name(claims.display_name())
            .with_device(claims.device.clone()),
    );
    let connection_id = connection.id.clone();
    let user_id = connection.user_id.clone();

    let (mut ws_sender, mut ws_receiver) = socket.split();

    if let Err(e) = state.presence.connection_opened(connection.clone()) {
        tracing::error!(connection_id = %connection_id, error = %e, "Connection rejected");
        if let Ok(json) = serde_json::to_string(&ServerMessage::close(Some(e.to_string()))) {
            let _ = ws_sender.send(Message::Text(json.into())).await;
        }
        let _ = ws_sender.close().await;
        return;
    }

    tracing::info!(
        connection_id = %connection_id,
        user_id = %user_id,
        "Hub connection established"
    );

    // Writer: drains the outbound queue until a close frame or a close request
    let writer_conn = connection.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                msg = rx.recv() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
                _ = writer_conn.closed() => OutboundMessage::Raw(ServerMessage::close(None)),
            };

            let text = match msg.to_json() {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize message");
                    continue;
                }
            };

            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }

            if msg.is_close() {
                let _ = ws_sender.close().await;
                break;
            }
        }
    });

    let reader_state = state.clone();
    let reader_conn = connection.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(msg) => {
                    if !process_message(msg, &reader_state, &reader_conn).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Hub receive error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task completed");
            recv_task.abort();
        }
        _ = &mut recv_task => {
            tracing::debug!(connection_id = %connection_id, "Receive task completed");
            send_task.abort();
        }
    }

    state.presence.connection_closed(&connection_id);

    tracing::info!(
        connection_id = %connection_id,
        user_id = %user_id,
        duration_secs = connection_start.elapsed().as_secs_f64(),
        "Hub connection closed"
    );
}

/// Returns false if the connection should be closed
async fn process_message(msg: Message, state: &AppState, connection: &Arc<Connection>) -> bool {
    match msg {
        Message::Text(text) => {
            connection.update_activity();

            let client_msg: ClientMessage = match serde_json::from_str(&text) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to parse client frame");
                    return true;
                }
            };

            handle_client_message(client_msg, state, connection).await;
            true
        }
        Message::Binary(_) => {
            tracing::warn!(connection_id = %connection.id, "Binary frames are not supported");
            true
        }
        Message::Ping(_) | Message::Pong(_) => {
            connection.update_activity();
            true
        }
        Message::Close(_) => {
            tracing::debug!(connection_id = %connection.id, "Received close frame");
            false
        }
    }
}

#[tracing::instrument(
    name = "hub.message",
    skip(msg, state, connection),
    fields(connection_id = %connection.id, user_id = %connection.user_id)
)]
async fn handle_client_message(msg: ClientMessage, state: &AppState, connection: &Arc<Connection>) {
    match msg {
        ClientMessage::Ping => {}
        ClientMessage::Invocation {
            invocation_id,
            target,
            arguments,
        } => {
            let outcome = state.hub.invoke(connection, &target, arguments);

            let Some(invocation_id) = invocation_id else {
                return;
            };
            let reply = match outcome {
                Ok(result) => ServerMessage::completion(invocation_id, result),
                Err(e) => ServerMessage::completion_error(invocation_id, e.to_string()),
            };
            if connection.send(reply).await.is_err() {
                tracing::debug!(method = %target, "Connection closed before completion was sent");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_header_token_wins_over_query() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        let query = HubQuery {
            access_token: Some("from-query".to_string()),
        };

        assert_eq!(extract_token(&query, &headers).as_deref(), Some("from-header"));
    }

    #[test]
    fn test_query_token_fallback() {
        let query = HubQuery {
            access_token: Some("from-query".to_string()),
        };
        assert_eq!(
            extract_token(&query, &HeaderMap::new()).as_deref(),
            Some("from-query")
        );
        assert!(extract_token(&HubQuery { access_token: None }, &HeaderMap::new()).is_none());
    }
}
