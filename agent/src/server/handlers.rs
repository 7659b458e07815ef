//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use openapi_server::models::{
    DeploymentInfo, ErrorResponse, HealthResponse, InferenceAccessIn, InferenceAccessOut,
    VersionResponse,
};
use reqwest::{header, Method};
use serde_json::Value;
use tracing::{debug, warn};

use crate::server::gate::InferenceAccess;
use crate::server::state::ServerState;
use crate::utils::version_info;

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

/// Inference access check used by model servers
pub async fn inference_access_handler(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<InferenceAccessIn>,
) -> Result<Json<InferenceAccessOut>, (StatusCode, Json<ErrorResponse>)> {
    match state.control_plane.authorize_inference_access(&body.api_key).await {
        Ok(authorized) => Ok(Json(InferenceAccessOut { authorized })),
        Err(e) => {
            warn!("Inference access check failed: {}", e);
            Err((
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse::new("Authorization check failed")),
            ))
        }
    }
}

/// Deployments served from this satellite
pub async fn deployments_handler(
    _access: InferenceAccess,
    State(state): State<Arc<ServerState>>,
) -> Json<Vec<DeploymentInfo>> {
    let deployments = state
        .store
        .list_active()
        .await
        .into_iter()
        .map(|d| DeploymentInfo {
            deployment_id: d.deployment_id.to_string(),
        })
        .collect();
    Json(deployments)
}

/// Forward a compute request to the deployment's model server
pub async fn compute_handler(
    access: InferenceAccess,
    State(state): State<Arc<ServerState>>,
    Path(deployment_id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ProxyError> {
    forward(&state, &access, &deployment_id, Method::POST, "compute", Some(&body)).await
}

/// Fetch the deployment's model manifest
pub async fn manifest_handler(
    access: InferenceAccess,
    State(state): State<Arc<ServerState>>,
    Path(deployment_id): Path<String>,
) -> Result<Json<Value>, ProxyError> {
    forward(&state, &access, &deployment_id, Method::GET, "manifest", None).await
}

/// Failure forwarding a request to a model server
#[derive(Debug)]
pub enum ProxyError {
    UnknownDeployment(String),
    Upstream(String),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        match self {
            ProxyError::UnknownDeployment(id) => (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new(format!("Deployment {} not found", id))),
            )
                .into_response(),
            ProxyError::Upstream(detail) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(detail)),
            )
                .into_response(),
        }
    }
}

async fn forward(
    state: &ServerState,
    access: &InferenceAccess,
    deployment_id: &str,
    method: Method,
    endpoint: &str,
    body: Option<&Value>,
) -> Result<Json<Value>, ProxyError> {
    let deployment = state
        .store
        .get(deployment_id)
        .await
        .ok_or_else(|| ProxyError::UnknownDeployment(deployment_id.to_string()))?;

    let url = format!(
        "{}/{}",
        deployment.inference_url.trim_end_matches('/'),
        endpoint
    );
    debug!("Forwarding {} {} for deployment {}", method, url, deployment_id);

    // The model server validates the caller's key through this agent again.
    let mut request = state
        .proxy
        .request(method, &url)
        .header(header::AUTHORIZATION, format!("Bearer {}", access.api_key));
    if let Some(body) = body {
        request = request.json(body);
    }

    let response = request
        .send()
        .await
        .map_err(|e| ProxyError::Upstream(format!("Connection error to model server: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(ProxyError::Upstream(format!(
            "Model server error: {} - {}",
            status.as_u16(),
            text
        )));
    }

    response
        .json::<Value>()
        .await
        .map(Json)
        .map_err(|e| ProxyError::Upstream(format!("Invalid model server response: {}", e)))
}
