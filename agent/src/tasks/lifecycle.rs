//! Task status state machine

use openapi_client::models::TaskStatus;

use crate::errors::AgentError;

/// Status change applied to a task while the agent executes it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    /// Execution started
    Start,

    /// Handler finished successfully
    Complete,

    /// Handler finished with a failure
    Fail,
}

/// Tracks a task through pending -> running -> done | failed.
///
/// Terminal states are final; there is no transition back to pending.
#[derive(Debug, Clone)]
pub struct TaskLifecycle {
    status: TaskStatus,
}

impl TaskLifecycle {
    pub fn new(status: TaskStatus) -> Self {
        Self { status }
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply an event, returning the new status
    pub fn process(&mut self, event: TaskEvent) -> Result<TaskStatus, AgentError> {
        let next = match (self.status, &event) {
            (TaskStatus::Pending, TaskEvent::Start) => TaskStatus::Running,
            (TaskStatus::Running, TaskEvent::Complete) => TaskStatus::Done,
            (TaskStatus::Running, TaskEvent::Fail) => TaskStatus::Failed,

            // A task that never started may still be failed, e.g. when marking
            // it running was rejected.
            (TaskStatus::Pending, TaskEvent::Fail) => TaskStatus::Failed,

            (status, event) => {
                return Err(AgentError::TaskError(format!(
                    "invalid transition: {} -> {:?}",
                    status, event
                )));
            }
        };

        self.status = next;
        Ok(next)
    }
}
