//! Deploy task: start a model container and publish its inference URL

use std::collections::BTreeMap;

use openapi_client::models::{DeploymentRecord, ResourceId};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::app::context::AgentContext;
use crate::deploy::runtime::{ContainerHandle, ContainerSpec, DEPLOYMENT_LABEL};
use crate::errors::AgentError;
use crate::models::deployment::LocalDeployment;
use crate::tasks::{DeploymentPayload, TaskFailure, TaskOutcome};
use crate::utils::tail_chars;

/// Env var carrying the presigned model artifact URL
pub const MODEL_ARTIFACT_URL_ENV: &str = "MODEL_ARTIFACT_URL";

/// Env var carrying every resolved secret as one JSON object
pub const MODEL_SECRETS_ENV: &str = "MODEL_SECRETS";

/// Longest log tail attached to a failed health check
pub const MAX_LOG_TAIL_CHARS: usize = 1000;

const ARTIFACT_FAILURE: &str = "failed to get model artifact url";

/// Outcome of resolving a single secret reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretResolution {
    Resolved(String),
    /// The secret could not be fetched; the deployment continues without it
    Skipped(String),
}

pub fn container_name(deployment_id: &ResourceId) -> String {
    format!("sat-{}", deployment_id)
}

/// Container environment for a model server
pub fn build_env(
    artifact_url: &str,
    secrets: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>, AgentError> {
    let mut env = BTreeMap::new();
    env.insert(MODEL_ARTIFACT_URL_ENV.to_string(), artifact_url.to_string());
    for (key, value) in secrets {
        env.insert(key.clone(), value.clone());
    }
    if !secrets.is_empty() {
        env.insert(MODEL_SECRETS_ENV.to_string(), serde_json::to_string(secrets)?);
    }
    Ok(env)
}

pub async fn run(ctx: &AgentContext, payload: DeploymentPayload) -> Result<TaskOutcome, AgentError> {
    let Some(deployment_id) = payload.deployment_id else {
        return Ok(TaskOutcome::failed("missing deployment_id"));
    };

    let (deployment, artifact_url) = match resolve_artifact(ctx, &deployment_id).await {
        Ok(resolved) => resolved,
        Err(e) => {
            return Ok(TaskOutcome::Failed(TaskFailure::new(ARTIFACT_FAILURE).with_error(e)));
        }
    };

    let secrets = resolve_secrets(ctx, &deployment).await;
    let spec = ContainerSpec {
        image: ctx.tasks.model_image.clone(),
        name: container_name(&deployment_id),
        container_port: ctx.tasks.container_port,
        labels: BTreeMap::from([(DEPLOYMENT_LABEL.to_string(), deployment_id.to_string())]),
        env: build_env(&artifact_url, &secrets)?,
    };

    let container = match ctx.runtime.run(&spec).await {
        Ok(container) => container,
        Err(e) => {
            return Ok(TaskOutcome::Failed(
                TaskFailure::new("failed to start container").with_error(e),
            ));
        }
    };

    let address = match ctx.runtime.inspect(&container.handle).await {
        Ok(network) => network.reachable_address().to_string(),
        Err(e) => {
            warn!("Could not inspect {}: {}; probing loopback", container.handle.name, e);
            "127.0.0.1".to_string()
        }
    };

    let health_url = format!("http://{}:{}/healthz", address, ctx.tasks.container_port);
    debug!("Waiting for {} to become healthy", health_url);
    if !ctx
        .runtime
        .wait_http_ok(&health_url, ctx.tasks.health_timeout)
        .await
    {
        let logs = container_logs(ctx, &container.handle).await;
        return Ok(TaskOutcome::Failed(
            TaskFailure::new("healthcheck timeout")
                .with_detail("tail", tail_chars(&logs, MAX_LOG_TAIL_CHARS)),
        ));
    }

    let inference_url = format!(
        "{}:{}",
        ctx.tasks.base_url.trim_end_matches('/'),
        container.host_port
    );
    ctx.control_plane
        .update_deployment_inference_url(&deployment_id, &inference_url)
        .await?;
    ctx.store
        .add(LocalDeployment::new(
            deployment_id.clone(),
            Some(container.handle.id.clone()),
            inference_url.clone(),
        ))
        .await?;

    info!("Deployment {} serving at {}", deployment_id, inference_url);
    Ok(TaskOutcome::Done(json!({ "inference_url": inference_url })))
}

async fn resolve_artifact(
    ctx: &AgentContext,
    deployment_id: &ResourceId,
) -> Result<(DeploymentRecord, String), AgentError> {
    let deployment = ctx
        .control_plane
        .list_deployments()
        .await?
        .into_iter()
        .find(|d| &d.id == deployment_id)
        .ok_or_else(|| AgentError::NotFound(format!("deployment {}", deployment_id)))?;

    let model_id = deployment.model_id.clone().ok_or_else(|| {
        AgentError::ValidationError(format!("deployment {} has no model", deployment_id))
    })?;
    let url = ctx
        .control_plane
        .get_model_artifact_download_url(&model_id)
        .await?;
    Ok((deployment, url))
}

async fn resolve_secret(ctx: &AgentContext, secret_id: &ResourceId) -> SecretResolution {
    match ctx.control_plane.get_orbit_secret(secret_id).await {
        Ok(secret) => SecretResolution::Resolved(secret.value_string()),
        Err(e) => SecretResolution::Skipped(e.to_string()),
    }
}

async fn resolve_secrets(ctx: &AgentContext, deployment: &DeploymentRecord) -> BTreeMap<String, String> {
    let mut resolved = BTreeMap::new();
    for (key, secret_id) in &deployment.secrets {
        match resolve_secret(ctx, secret_id).await {
            SecretResolution::Resolved(value) => {
                resolved.insert(key.clone(), value);
            }
            SecretResolution::Skipped(reason) => {
                warn!("Skipping secret {} ({}): {}", key, secret_id, reason);
            }
        }
    }
    resolved
}

/// Best-effort container output; empty when logs cannot be read
async fn container_logs(ctx: &AgentContext, handle: &ContainerHandle) -> String {
    match ctx.runtime.logs(handle, ctx.tasks.log_tail_lines).await {
        Ok(logs) => logs,
        Err(e) => {
            warn!("Could not read logs of {}: {}", handle.name, e);
            String::new()
        }
    }
}
