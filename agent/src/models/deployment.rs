//! Deployment models

use openapi_client::models::ResourceId;
use serde::{Deserialize, Serialize};

/// A model container this satellite is serving
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalDeployment {
    /// Control-plane deployment id
    pub deployment_id: ResourceId,

    /// Container id; unknown for entries recovered by reconciliation
    #[serde(default)]
    pub container_id: Option<String>,

    /// URL the model server is reachable at
    #[serde(rename = "model_url", alias = "inference_url")]
    pub inference_url: String,
}

impl LocalDeployment {
    pub fn new(
        deployment_id: ResourceId,
        container_id: Option<String>,
        inference_url: impl Into<String>,
    ) -> Self {
        Self {
            deployment_id,
            container_id,
            inference_url: inference_url.into(),
        }
    }
}
