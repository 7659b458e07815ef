//! Container runtime contract

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use openapi_client::models::ResourceId;

use crate::errors::AgentError;

/// Label every model container carries, valued with its deployment id
pub const DEPLOYMENT_LABEL: &str = "df.deployment_id";

/// What to start
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub image: String,
    pub name: String,
    /// Port inside the container, published to an ephemeral host port
    pub container_port: u16,
    pub labels: BTreeMap<String, String>,
    pub env: BTreeMap<String, String>,
}

/// Reference to a started container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
}

/// A started container and the host port its container port is published on
#[derive(Debug, Clone)]
pub struct RunningContainer {
    pub handle: ContainerHandle,
    pub host_port: u16,
}

/// Network facts reported by container inspection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerNetwork {
    /// Address on the default bridge network
    pub bridge_ip: Option<String>,
    /// Primary address reported outside any named network
    pub ip: Option<String>,
}

impl ContainerNetwork {
    /// Address the agent should use to reach the container
    pub fn reachable_address(&self) -> &str {
        self.bridge_ip
            .as_deref()
            .filter(|ip| !ip.is_empty())
            .or_else(|| self.ip.as_deref().filter(|ip| !ip.is_empty()))
            .unwrap_or("127.0.0.1")
    }
}

/// Starts, inspects and removes model containers
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Start a container, returning it with the published host port
    async fn run(&self, spec: &ContainerSpec) -> Result<RunningContainer, AgentError>;

    /// Stop and delete the container labelled with `deployment_id`.
    /// Returns whether a container was found.
    async fn remove(&self, deployment_id: &ResourceId) -> Result<bool, AgentError>;

    /// Poll GET `url` until it answers 200 or `timeout` elapses
    async fn wait_http_ok(&self, url: &str, timeout: Duration) -> bool;

    /// Network metadata of a container
    async fn inspect(&self, handle: &ContainerHandle) -> Result<ContainerNetwork, AgentError>;

    /// The last `tail` lines of a container's output
    async fn logs(&self, handle: &ContainerHandle, tail: usize) -> Result<String, AgentError>;
}
