//! Server state

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use crate::errors::AgentError;
use crate::http::control_plane::ControlPlane;
use crate::storage::deployments::LocalDeploymentStore;

/// Server state shared across handlers
pub struct ServerState {
    pub control_plane: Arc<dyn ControlPlane>,
    pub store: Arc<LocalDeploymentStore>,
    /// Client used to forward requests to model containers
    pub proxy: Client,
}

impl ServerState {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        store: Arc<LocalDeploymentStore>,
        proxy_timeout: Duration,
    ) -> Result<Self, AgentError> {
        let proxy = Client::builder().timeout(proxy_timeout).build()?;
        Ok(Self {
            control_plane,
            store,
            proxy,
        })
    }
}
