//! Inference access gate.
//!
//! Requests to deployment routes must carry `Authorization: Bearer <key>`;
//! the key is checked against the control plane on every request and the
//! gate never lets a request through when that check cannot be made.

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use openapi_server::models::ErrorResponse;
use tracing::warn;

use crate::server::state::ServerState;

/// Proof that the caller's API key was accepted
#[derive(Debug, Clone)]
pub struct InferenceAccess {
    pub api_key: String,
}

#[derive(Debug)]
pub enum GateRejection {
    /// No bearer token, or a malformed header
    MissingApiKey,
    /// The control plane rejected the key
    Forbidden,
    /// The control plane could not be asked
    CheckFailed,
}

impl IntoResponse for GateRejection {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            GateRejection::MissingApiKey => (StatusCode::UNAUTHORIZED, "Missing API key"),
            GateRejection::Forbidden => (StatusCode::FORBIDDEN, "Invalid API key"),
            GateRejection::CheckFailed => (StatusCode::BAD_GATEWAY, "Authorization check failed"),
        };
        (status, Json(ErrorResponse::new(detail))).into_response()
    }
}

/// Token from an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

impl FromRequestParts<Arc<ServerState>> for InferenceAccess {
    type Rejection = GateRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<ServerState>,
    ) -> Result<Self, Self::Rejection> {
        let api_key = bearer_token(&parts.headers).ok_or(GateRejection::MissingApiKey)?;

        match state.control_plane.authorize_inference_access(&api_key).await {
            Ok(true) => Ok(Self { api_key }),
            Ok(false) => Err(GateRejection::Forbidden),
            Err(e) => {
                warn!("Inference access check failed: {}", e);
                Err(GateRejection::CheckFailed)
            }
        }
    }
}
