//! Hub credential endpoint.

use axum::{extract::State, http::HeaderMap, Json};
use serde::Serialize;

use crate::server::{extract_bearer_token, AppState};

#[derive(Debug, Serialize)]
pub struct HubTokenResponse {
    pub token: Option<String>,
}

/// GET /api/auth/hub-token
///
/// Mints a short-lived hub credential for the session named by the bearer
/// token. Callers without a valid session get `{"token": null}`.
pub async fn hub_token(State(state): State<AppState>, headers: HeaderMap) -> Json<HubTokenResponse> {
    let Some(session_token) = extract_bearer_token(&headers) else {
        return Json(HubTokenResponse { token: None });
    };

    let token = match state.jwt_validator.validate_session(session_token) {
        Ok(session) => match state.token_issuer.issue(&session) {
            Ok(token) => Some(token),
            Err(e) => {
                tracing::error!(error = %e, "Failed to mint hub credential");
                None
            }
        },
        Err(e) => {
            tracing::debug!(error = %e, "Hub credential requested without a valid session");
            None
        }
    };

    Json(HubTokenResponse { token })
}
