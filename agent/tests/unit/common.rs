//! In-memory collaborators shared by the integration tests

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use openapi_client::models::{
    Capabilities, DeploymentRecord, DeploymentStatus, OrbitSecret, ResourceId, Task, TaskStatus,
};
use satellite_agent::app::context::AgentContext;
use satellite_agent::deploy::runtime::{
    ContainerHandle, ContainerNetwork, ContainerRuntime, ContainerSpec, RunningContainer,
};
use satellite_agent::errors::AgentError;
use satellite_agent::filesys::file::File;
use satellite_agent::http::control_plane::ControlPlane;
use satellite_agent::storage::deployments::LocalDeploymentStore;
use satellite_agent::tasks::TaskOptions;
use serde_json::{json, Value};

pub fn unavailable(what: &str) -> AgentError {
    AgentError::ControlPlaneError {
        status: 503,
        body: format!("{} unavailable", what),
    }
}

pub fn task(id: i64, task_type: &str, payload: Value) -> Task {
    serde_json::from_value(json!({
        "id": id,
        "satellite_id": 1,
        "orbit_id": 1,
        "type": task_type,
        "payload": payload,
        "status": "pending",
        "scheduled_at": "2026-01-01T00:00:00Z",
    }))
    .unwrap()
}

pub fn deployment(id: i64, model_id: i64, secrets: &[(&str, i64)]) -> DeploymentRecord {
    DeploymentRecord {
        id: ResourceId::from(id),
        orbit_id: None,
        satellite_id: None,
        status: DeploymentStatus::Pending,
        model_id: Some(ResourceId::from(model_id)),
        inference_url: None,
        secrets: secrets
            .iter()
            .map(|(key, secret)| (key.to_string(), ResourceId::from(*secret)))
            .collect(),
    }
}

pub fn active_deployment(id: i64, inference_url: &str) -> DeploymentRecord {
    DeploymentRecord {
        status: DeploymentStatus::Active,
        inference_url: Some(inference_url.to_string()),
        ..deployment(id, 1, &[])
    }
}

/// A recorded `update_task_status` call
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub task_id: ResourceId,
    pub status: TaskStatus,
    pub result: Option<Value>,
}

#[derive(Default)]
pub struct ControlPlaneState {
    pub tasks: Vec<Task>,
    pub deployments: Vec<DeploymentRecord>,
    pub secrets: BTreeMap<String, String>,
    pub authorized_keys: HashSet<String>,

    pub fail_list_tasks: bool,
    pub fail_list_deployments: bool,
    pub fail_artifact_url: bool,
    pub fail_delete: bool,
    pub fail_pair: bool,
    pub fail_authorize: bool,
    pub fail_update_inference_url: bool,
    /// Task ids whose `running` update is rejected
    pub reject_running_for: HashSet<String>,
    /// Reject every status update
    pub fail_status_updates: bool,

    pub status_updates: Vec<StatusUpdate>,
    pub inference_urls: Vec<(ResourceId, String)>,
    pub deleted: Vec<ResourceId>,
    pub paired: Vec<(String, Capabilities)>,
}

#[derive(Default)]
pub struct FakeControlPlane {
    pub state: Mutex<ControlPlaneState>,
}

impl FakeControlPlane {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut ControlPlaneState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn updates_for(&self, task_id: &str) -> Vec<StatusUpdate> {
        self.with(|s| {
            s.status_updates
                .iter()
                .filter(|u| u.task_id.as_str() == task_id)
                .cloned()
                .collect()
        })
    }

    /// The single terminal update reported for a task
    pub fn terminal_update(&self, task_id: &str) -> StatusUpdate {
        let terminal: Vec<_> = self
            .updates_for(task_id)
            .into_iter()
            .filter(|u| u.status.is_terminal())
            .collect();
        assert_eq!(terminal.len(), 1, "expected one terminal update: {:?}", terminal);
        terminal.into_iter().next().unwrap()
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn list_tasks(&self, status: TaskStatus) -> Result<Vec<Task>, AgentError> {
        self.with(|s| {
            if s.fail_list_tasks {
                return Err(unavailable("tasks"));
            }
            Ok(s.tasks.iter().filter(|t| t.status == status).cloned().collect())
        })
    }

    async fn update_task_status(
        &self,
        task_id: &ResourceId,
        status: TaskStatus,
        result: Option<Value>,
    ) -> Result<(), AgentError> {
        self.with(|s| {
            if s.fail_status_updates
                || (status == TaskStatus::Running && s.reject_running_for.contains(task_id.as_str()))
            {
                return Err(unavailable("status"));
            }
            s.status_updates.push(StatusUpdate {
                task_id: task_id.clone(),
                status,
                result,
            });
            if let Some(task) = s.tasks.iter_mut().find(|t| &t.id == task_id) {
                task.status = status;
            }
            Ok(())
        })
    }

    async fn list_deployments(&self) -> Result<Vec<DeploymentRecord>, AgentError> {
        self.with(|s| {
            if s.fail_list_deployments {
                return Err(unavailable("deployments"));
            }
            Ok(s.deployments.clone())
        })
    }

    async fn get_model_artifact_download_url(
        &self,
        model_id: &ResourceId,
    ) -> Result<String, AgentError> {
        self.with(|s| {
            if s.fail_artifact_url {
                return Err(unavailable("artifacts"));
            }
            Ok(format!("https://bucket.local/models/{}.dfs?sig=abc", model_id))
        })
    }

    async fn get_orbit_secret(&self, secret_id: &ResourceId) -> Result<OrbitSecret, AgentError> {
        self.with(|s| match s.secrets.get(secret_id.as_str()) {
            Some(value) => Ok(OrbitSecret {
                name: None,
                value: Value::String(value.clone()),
            }),
            None => Err(AgentError::ControlPlaneError {
                status: 404,
                body: "secret not found".to_string(),
            }),
        })
    }

    async fn update_deployment_inference_url(
        &self,
        deployment_id: &ResourceId,
        inference_url: &str,
    ) -> Result<(), AgentError> {
        self.with(|s| {
            if s.fail_update_inference_url {
                return Err(unavailable("deployments"));
            }
            s.inference_urls
                .push((deployment_id.clone(), inference_url.to_string()));
            Ok(())
        })
    }

    async fn delete_deployment(&self, deployment_id: &ResourceId) -> Result<(), AgentError> {
        self.with(|s| {
            if s.fail_delete {
                return Err(unavailable("deployments"));
            }
            s.deleted.push(deployment_id.clone());
            Ok(())
        })
    }

    async fn pair_satellite(
        &self,
        base_url: &str,
        capabilities: &Capabilities,
    ) -> Result<(), AgentError> {
        self.with(|s| {
            if s.fail_pair {
                return Err(unavailable("pairing"));
            }
            s.paired.push((base_url.to_string(), capabilities.clone()));
            Ok(())
        })
    }

    async fn authorize_inference_access(&self, api_key: &str) -> Result<bool, AgentError> {
        self.with(|s| {
            if s.fail_authorize {
                return Err(unavailable("auth"));
            }
            Ok(s.authorized_keys.contains(api_key))
        })
    }
}

#[derive(Default)]
pub struct RuntimeState {
    pub fail_run: bool,
    pub fail_remove: bool,
    pub fail_inspect: bool,
    pub fail_logs: bool,
    pub container_present: bool,
    /// Health answer when `healthy_urls` has no entry for the URL
    pub healthy: bool,
    pub healthy_urls: BTreeMap<String, bool>,
    pub network: ContainerNetwork,
    pub logs: String,
    pub host_port: u16,

    pub runs: Vec<ContainerSpec>,
    pub removed: Vec<ResourceId>,
    pub probed: Vec<(String, Duration)>,
}

#[derive(Default)]
pub struct FakeRuntime {
    pub state: Mutex<RuntimeState>,
}

impl FakeRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(RuntimeState {
                healthy: true,
                container_present: true,
                host_port: 49153,
                network: ContainerNetwork {
                    bridge_ip: Some("172.17.0.2".to_string()),
                    ip: None,
                },
                ..Default::default()
            }),
        })
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut RuntimeState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn run(&self, spec: &ContainerSpec) -> Result<RunningContainer, AgentError> {
        self.with(|s| {
            s.runs.push(spec.clone());
            if s.fail_run {
                return Err(AgentError::RuntimeError("image not found".to_string()));
            }
            Ok(RunningContainer {
                handle: ContainerHandle {
                    id: format!("cid-{}", spec.name),
                    name: spec.name.clone(),
                },
                host_port: s.host_port,
            })
        })
    }

    async fn remove(&self, deployment_id: &ResourceId) -> Result<bool, AgentError> {
        self.with(|s| {
            if s.fail_remove {
                return Err(AgentError::RuntimeError("daemon unreachable".to_string()));
            }
            s.removed.push(deployment_id.clone());
            Ok(s.container_present)
        })
    }

    async fn wait_http_ok(&self, url: &str, timeout: Duration) -> bool {
        self.with(|s| {
            s.probed.push((url.to_string(), timeout));
            s.healthy_urls.get(url).copied().unwrap_or(s.healthy)
        })
    }

    async fn inspect(&self, _handle: &ContainerHandle) -> Result<ContainerNetwork, AgentError> {
        self.with(|s| {
            if s.fail_inspect {
                return Err(AgentError::RuntimeError("no such container".to_string()));
            }
            Ok(s.network.clone())
        })
    }

    async fn logs(&self, _handle: &ContainerHandle, _tail: usize) -> Result<String, AgentError> {
        self.with(|s| {
            if s.fail_logs {
                return Err(AgentError::RuntimeError("logs unavailable".to_string()));
            }
            Ok(s.logs.clone())
        })
    }
}

/// Context wired to fakes with a store in a fresh temp dir
pub struct Harness {
    pub control_plane: Arc<FakeControlPlane>,
    pub runtime: Arc<FakeRuntime>,
    pub store: Arc<LocalDeploymentStore>,
    pub ctx: AgentContext,
    _dir: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let control_plane = FakeControlPlane::new();
        let runtime = FakeRuntime::new();
        let store = Arc::new(LocalDeploymentStore::new(File::new(
            dir.path().join("deployments.json"),
        )));
        let tasks = TaskOptions {
            base_url: "http://sat.example".to_string(),
            health_timeout: Duration::from_secs(45),
            ..TaskOptions::default()
        };
        let ctx = AgentContext::new(
            control_plane.clone(),
            runtime.clone(),
            store.clone(),
            tasks,
        );

        Self {
            control_plane,
            runtime,
            store,
            ctx,
            _dir: dir,
        }
    }
}
