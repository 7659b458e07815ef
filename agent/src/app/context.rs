//! Services shared by the task engine, workers and the HTTP server

use std::sync::Arc;

use crate::deploy::runtime::ContainerRuntime;
use crate::http::control_plane::ControlPlane;
use crate::storage::deployments::LocalDeploymentStore;
use crate::tasks::TaskOptions;

/// Everything a task handler may touch, passed explicitly
#[derive(Clone)]
pub struct AgentContext {
    pub control_plane: Arc<dyn ControlPlane>,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub store: Arc<LocalDeploymentStore>,
    pub tasks: Arc<TaskOptions>,
}

impl AgentContext {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        runtime: Arc<dyn ContainerRuntime>,
        store: Arc<LocalDeploymentStore>,
        tasks: TaskOptions,
    ) -> Self {
        Self {
            control_plane,
            runtime,
            store,
            tasks: Arc::new(tasks),
        }
    }
}
