//! Control plane API client

use async_trait::async_trait;
use openapi_client::models::{
    Capabilities, DeploymentRecord, DownloadUrlResponse, InferenceAccessRequest,
    InferenceAccessResponse, InferenceUrlUpdate, OrbitSecret, PairSatelliteRequest, ResourceId,
    Task, TaskStatus, TaskStatusUpdate,
};
use reqwest::Method;
use serde_json::Value;

use crate::errors::AgentError;
use crate::http::client::HttpClient;

/// Operations the agent needs from the control plane.
///
/// Implemented over HTTP by [`HttpClient`]; tests substitute in-memory fakes.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// List this satellite's tasks with the given status
    async fn list_tasks(&self, status: TaskStatus) -> Result<Vec<Task>, AgentError>;

    /// Report a task status transition
    async fn update_task_status(
        &self,
        task_id: &ResourceId,
        status: TaskStatus,
        result: Option<Value>,
    ) -> Result<(), AgentError>;

    /// List deployments assigned to this satellite
    async fn list_deployments(&self) -> Result<Vec<DeploymentRecord>, AgentError>;

    /// Time-limited download URL for a model artifact
    async fn get_model_artifact_download_url(
        &self,
        model_id: &ResourceId,
    ) -> Result<String, AgentError>;

    /// Resolve an orbit secret
    async fn get_orbit_secret(&self, secret_id: &ResourceId) -> Result<OrbitSecret, AgentError>;

    /// Report where a deployment can be reached
    async fn update_deployment_inference_url(
        &self,
        deployment_id: &ResourceId,
        inference_url: &str,
    ) -> Result<(), AgentError>;

    /// Ask the control plane to mark a deployment deleted
    async fn delete_deployment(&self, deployment_id: &ResourceId) -> Result<(), AgentError>;

    /// Pair this satellite, advertising its capabilities
    async fn pair_satellite(
        &self,
        base_url: &str,
        capabilities: &Capabilities,
    ) -> Result<(), AgentError>;

    /// Check whether an inference API key may call this satellite's deployments
    async fn authorize_inference_access(&self, api_key: &str) -> Result<bool, AgentError>;
}

#[async_trait]
impl ControlPlane for HttpClient {
    async fn list_tasks(&self, status: TaskStatus) -> Result<Vec<Task>, AgentError> {
        self.get_with_query("/satellites/tasks", &[("status", status.as_str())])
            .await
    }

    async fn update_task_status(
        &self,
        task_id: &ResourceId,
        status: TaskStatus,
        result: Option<Value>,
    ) -> Result<(), AgentError> {
        let path = format!("/satellites/tasks/{}/status", task_id);
        let update = TaskStatusUpdate { status, result };
        self.execute(Method::POST, &path, Some(&update)).await
    }

    async fn list_deployments(&self) -> Result<Vec<DeploymentRecord>, AgentError> {
        self.get("/satellites/deployments").await
    }

    async fn get_model_artifact_download_url(
        &self,
        model_id: &ResourceId,
    ) -> Result<String, AgentError> {
        let path = format!("/satellites/model-artifacts/{}/download-url", model_id);
        let response: DownloadUrlResponse = self.get(&path).await?;
        Ok(response.url)
    }

    async fn get_orbit_secret(&self, secret_id: &ResourceId) -> Result<OrbitSecret, AgentError> {
        let path = format!("/satellites/secrets/{}", secret_id);
        self.get(&path).await
    }

    async fn update_deployment_inference_url(
        &self,
        deployment_id: &ResourceId,
        inference_url: &str,
    ) -> Result<(), AgentError> {
        let path = format!("/satellites/deployments/{}", deployment_id);
        let update = InferenceUrlUpdate {
            inference_url: inference_url.to_string(),
        };
        self.execute(Method::PATCH, &path, Some(&update)).await
    }

    async fn delete_deployment(&self, deployment_id: &ResourceId) -> Result<(), AgentError> {
        let path = format!("/satellites/deployments/{}", deployment_id);
        self.execute::<()>(Method::DELETE, &path, None).await
    }

    async fn pair_satellite(
        &self,
        base_url: &str,
        capabilities: &Capabilities,
    ) -> Result<(), AgentError> {
        let request = PairSatelliteRequest {
            base_url: base_url.to_string(),
            capabilities: capabilities.clone(),
        };
        self.execute(Method::POST, "/satellites/pair", Some(&request))
            .await
    }

    async fn authorize_inference_access(&self, api_key: &str) -> Result<bool, AgentError> {
        let request = InferenceAccessRequest {
            api_key: api_key.to_string(),
        };
        let response: InferenceAccessResponse = self
            .post("/satellites/deployments/inference-access", &request)
            .await?;
        Ok(response.authorized)
    }
}
