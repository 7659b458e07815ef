//! Pairing task

use serde_json::json;
use tracing::info;

use crate::app::context::AgentContext;
use crate::errors::AgentError;
use crate::tasks::TaskOutcome;

/// Advertise this satellite's capabilities and base URL to the control plane
pub async fn run(ctx: &AgentContext) -> Result<TaskOutcome, AgentError> {
    let base_url = ctx.tasks.base_url.trim_end_matches('/');
    let capabilities = &ctx.tasks.capabilities;

    ctx.control_plane
        .pair_satellite(base_url, capabilities)
        .await?;
    info!("Paired satellite at {}", base_url);

    Ok(TaskOutcome::Done(json!({
        "capabilities": capabilities,
        "base_url": base_url,
    })))
}
