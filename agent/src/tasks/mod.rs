//! Task engine: resolves control-plane tasks into handlers and reports
//! their status transitions.

pub mod deploy;
pub mod lifecycle;
pub mod pairing;
pub mod undeploy;

use std::fmt;
use std::time::Duration;

use openapi_client::models::{Capabilities, ResourceId, Task, TaskStatus, TaskType};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use crate::app::context::AgentContext;
use crate::errors::AgentError;
use crate::storage::settings::Settings;
use crate::tasks::lifecycle::{TaskEvent, TaskLifecycle};

/// Settings the task handlers read
#[derive(Debug, Clone)]
pub struct TaskOptions {
    /// Public base URL of this host, without a port
    pub base_url: String,

    /// Capabilities advertised when pairing
    pub capabilities: Capabilities,

    /// Image every model container is started from
    pub model_image: String,

    /// Port the model server listens on inside its container
    pub container_port: u16,

    /// How long a new container has to answer its health check
    pub health_timeout: Duration,

    /// Log lines captured when a container fails its health check
    pub log_tail_lines: usize,
}

impl TaskOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            base_url: settings.base_url.clone(),
            capabilities: settings.pairing.capabilities(),
            model_image: settings.deploy.model_image.clone(),
            container_port: settings.deploy.container_port,
            health_timeout: Duration::from_secs(settings.deploy.health_timeout_secs),
            log_tail_lines: settings.deploy.log_tail_lines,
        }
    }
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Payload shared by deploy and undeploy tasks
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeploymentPayload {
    #[serde(default)]
    pub deployment_id: Option<ResourceId>,
}

/// The closed set of tasks this agent executes
#[derive(Debug, Clone)]
pub enum TaskKind {
    Pairing,
    Deploy(DeploymentPayload),
    Undeploy(DeploymentPayload),
}

impl TaskKind {
    /// Resolve a task's type and payload; unknown types and malformed
    /// payloads are task failures, not agent errors
    pub fn from_task(task: &Task) -> Result<Self, TaskFailure> {
        match task.task_type {
            TaskType::Pairing => Ok(TaskKind::Pairing),
            TaskType::Deploy => Ok(TaskKind::Deploy(parse_payload(&task.payload)?)),
            TaskType::Undeploy => Ok(TaskKind::Undeploy(parse_payload(&task.payload)?)),
            TaskType::Unknown => Err(TaskFailure::new("unsupported task type")),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::Pairing => "pairing",
            TaskKind::Deploy(_) => "deploy",
            TaskKind::Undeploy(_) => "undeploy",
        }
    }
}

fn parse_payload<T: DeserializeOwned + Default>(payload: &Value) -> Result<T, TaskFailure> {
    if payload.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(payload.clone())
        .map_err(|e| TaskFailure::new("invalid payload").with_error(e))
}

/// Diagnostic result of a failed task: `{"reason": ..., <details>}`
#[derive(Debug, Clone, PartialEq)]
pub struct TaskFailure {
    reason: String,
    details: Map<String, Value>,
}

impl TaskFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            details: Map::new(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details.get(key)
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Attach the underlying error under `error`
    pub fn with_error(self, error: impl fmt::Display) -> Self {
        self.with_detail("error", error.to_string())
    }

    pub fn to_value(&self) -> Value {
        let mut result = Map::with_capacity(self.details.len() + 1);
        result.insert("reason".to_string(), Value::String(self.reason.clone()));
        for (key, value) in &self.details {
            result.insert(key.clone(), value.clone());
        }
        Value::Object(result)
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)?;
        if let Some(error) = self.details.get("error").and_then(Value::as_str) {
            write!(f, ": {}", error)?;
        }
        Ok(())
    }
}

/// Terminal result of a task
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Done(Value),
    Failed(TaskFailure),
}

impl TaskOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        TaskOutcome::Failed(TaskFailure::new(reason))
    }

    pub fn status(&self) -> TaskStatus {
        match self {
            TaskOutcome::Done(_) => TaskStatus::Done,
            TaskOutcome::Failed(_) => TaskStatus::Failed,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, TaskOutcome::Done(_))
    }

    /// Result body reported with the terminal status
    pub fn result(&self) -> Value {
        match self {
            TaskOutcome::Done(value) => value.clone(),
            TaskOutcome::Failed(failure) => failure.to_value(),
        }
    }

    fn event(&self) -> TaskEvent {
        match self {
            TaskOutcome::Done(_) => TaskEvent::Complete,
            TaskOutcome::Failed(_) => TaskEvent::Fail,
        }
    }
}

/// Executes tasks against the agent's collaborators
#[derive(Clone)]
pub struct TaskEngine {
    ctx: AgentContext,
}

impl TaskEngine {
    pub fn new(ctx: AgentContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &AgentContext {
        &self.ctx
    }

    /// Run one pending task to a terminal status.
    ///
    /// The task is marked running, its handler runs, and the terminal status
    /// is reported once. An `Err` means the handler could not finish and no
    /// terminal status was written; the caller decides how to report it.
    pub async fn dispatch(&self, task: &Task) -> Result<TaskOutcome, AgentError> {
        let mut lifecycle = TaskLifecycle::new(task.status);
        lifecycle.process(TaskEvent::Start)?;

        let control_plane = &self.ctx.control_plane;
        control_plane
            .update_task_status(&task.id, TaskStatus::Running, None)
            .await?;

        let outcome = match TaskKind::from_task(task) {
            Ok(kind) => {
                info!("Running {} task {}", kind.name(), task.id);
                self.execute(kind).await?
            }
            Err(failure) => {
                warn!("Rejecting task {} ({:?}): {}", task.id, task.task_type, failure);
                TaskOutcome::Failed(failure)
            }
        };

        let status = lifecycle.process(outcome.event())?;
        match &outcome {
            TaskOutcome::Done(_) => info!("Task {} done", task.id),
            TaskOutcome::Failed(failure) => warn!("Task {} failed: {}", task.id, failure),
        }

        // Terminal status is written at most once; a failed report is not retried.
        if let Err(e) = control_plane
            .update_task_status(&task.id, status, Some(outcome.result()))
            .await
        {
            error!("Failed to report task {} as {}: {}", task.id, status, e);
        }
        Ok(outcome)
    }

    async fn execute(&self, kind: TaskKind) -> Result<TaskOutcome, AgentError> {
        match kind {
            TaskKind::Pairing => pairing::run(&self.ctx).await,
            TaskKind::Deploy(payload) => deploy::run(&self.ctx, payload).await,
            TaskKind::Undeploy(payload) => undeploy::run(&self.ctx, payload).await,
        }
    }
}
