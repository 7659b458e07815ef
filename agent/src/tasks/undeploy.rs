//! Undeploy task

use serde_json::json;
use tracing::{info, warn};

use crate::app::context::AgentContext;
use crate::errors::AgentError;
use crate::tasks::{DeploymentPayload, TaskFailure, TaskOutcome};

/// Remove a deployment's container, mark it deleted and forget it locally.
///
/// A failed container removal leaves everything untouched. A failed delete
/// call leaves the container removed while the control plane and local
/// store still list the deployment.
pub async fn run(ctx: &AgentContext, payload: DeploymentPayload) -> Result<TaskOutcome, AgentError> {
    let Some(deployment_id) = payload.deployment_id else {
        return Ok(TaskOutcome::failed("missing deployment_id"));
    };

    let container_removed = match ctx.runtime.remove(&deployment_id).await {
        Ok(removed) => removed,
        Err(e) => {
            return Ok(TaskOutcome::Failed(
                TaskFailure::new("failed to remove container").with_error(e),
            ));
        }
    };

    if let Err(e) = ctx.control_plane.delete_deployment(&deployment_id).await {
        warn!(
            "Container for deployment {} removed but the deployment was not marked deleted",
            deployment_id
        );
        return Ok(TaskOutcome::Failed(
            TaskFailure::new("failed to mark deployment deleted").with_error(e),
        ));
    }

    ctx.store.remove(&deployment_id).await?;
    info!(
        "Undeployed {} (container removed: {})",
        deployment_id, container_removed
    );

    Ok(TaskOutcome::Done(json!({ "container_removed": container_removed })))
}
