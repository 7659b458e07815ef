//! API models

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Identifier of a control-plane resource (task, deployment, model, secret).
///
/// The control plane has used both integer and string identifiers, so both are
/// accepted on the wire. Identifiers are always serialized as strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ResourceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<i64> for ResourceId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl Serialize for ResourceId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ResourceId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Str(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Int(id) => Ok(ResourceId(id.to_string())),
            Raw::Str(id) if id.trim().is_empty() => {
                Err(serde::de::Error::custom("resource id must not be empty"))
            }
            Raw::Str(id) => Ok(ResourceId(id)),
        }
    }
}

/// Satellite task type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Pairing,
    Deploy,
    Undeploy,
    /// Any type this agent version does not know how to execute
    #[serde(other)]
    Unknown,
}

/// Satellite task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work queued by the control plane for this satellite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: ResourceId,
    #[serde(default)]
    pub satellite_id: Option<ResourceId>,
    #[serde(default)]
    pub orbit_id: Option<ResourceId>,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub status: TaskStatus,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
}

/// Task status update sent by the satellite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusUpdate {
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

/// Deployment status as tracked by the control plane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Pending,
    Active,
    Failed,
    Deleted,
    #[serde(other)]
    Unknown,
}

/// Deployment record owned by the control plane
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub id: ResourceId,
    #[serde(default)]
    pub orbit_id: Option<ResourceId>,
    #[serde(default)]
    pub satellite_id: Option<ResourceId>,
    pub status: DeploymentStatus,
    /// Model artifact the deployment serves
    #[serde(default)]
    pub model_id: Option<ResourceId>,
    #[serde(default)]
    pub inference_url: Option<String>,
    /// Environment variable name -> orbit secret id; `null` or a non-object
    /// reads as no secrets
    #[serde(default, deserialize_with = "secret_refs")]
    pub secrets: BTreeMap<String, ResourceId>,
}

fn secret_refs<'de, D>(deserializer: D) -> Result<BTreeMap<String, ResourceId>, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        value @ serde_json::Value::Object(_) => {
            serde_json::from_value(value).map_err(serde::de::Error::custom)
        }
        _ => Ok(BTreeMap::new()),
    }
}

/// Presigned model artifact download URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadUrlResponse {
    pub url: String,
}

/// Orbit secret value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrbitSecret {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl OrbitSecret {
    /// Secret value rendered as an environment variable value
    pub fn value_string(&self) -> String {
        match &self.value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// Inference URL report for a deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceUrlUpdate {
    pub inference_url: String,
}

/// Settings for a single capability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySpec {
    pub max_concurrency: u32,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// Capability name -> settings, e.g. `{"deploy": {"max_concurrency": 2, ...}}`
pub type Capabilities = BTreeMap<String, CapabilitySpec>;

/// Satellite pairing request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairSatelliteRequest {
    pub base_url: String,
    pub capabilities: Capabilities,
}

/// Inference access check request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceAccessRequest {
    pub api_key: String,
}

/// Inference access check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceAccessResponse {
    pub authorized: bool,
}
