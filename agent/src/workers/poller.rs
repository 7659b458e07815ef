//! Periodic task controller: poll pending tasks, dispatch, sleep

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use openapi_client::models::TaskStatus;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::errors::AgentError;
use crate::tasks::TaskEngine;

/// Poller worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Delay between ticks
    pub interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
        }
    }
}

/// What a single tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Pending tasks returned by the control plane
    pub fetched: usize,
    pub done: usize,
    pub failed: usize,
    /// Tasks whose handler errored and were reported as handler errors
    pub errored: usize,
    /// Set when the tick did nothing because another was in progress
    pub skipped: bool,
}

/// Drives the task engine on a fixed interval
pub struct PeriodicController {
    engine: TaskEngine,
    options: Options,
    stopped: AtomicBool,
    in_flight: Mutex<()>,
}

impl PeriodicController {
    pub fn new(engine: TaskEngine, options: Options) -> Self {
        Self {
            engine,
            options,
            stopped: AtomicBool::new(false),
            in_flight: Mutex::new(()),
        }
    }

    /// Ask the loop to exit before its next tick; a running tick finishes
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Fetch pending tasks and dispatch them one at a time.
    ///
    /// Only listing the tasks can fail; every per-task error is reported to
    /// the control plane as a failed task and counted.
    pub async fn tick(&self) -> Result<TickReport, AgentError> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            debug!("Previous tick still running, skipping");
            return Ok(TickReport {
                skipped: true,
                ..Default::default()
            });
        };

        let control_plane = &self.engine.context().control_plane;
        let tasks = control_plane.list_tasks(TaskStatus::Pending).await?;
        let mut report = TickReport {
            fetched: tasks.len(),
            ..Default::default()
        };

        for task in &tasks {
            if task.status != TaskStatus::Pending {
                debug!("Ignoring task {} in status {}", task.id, task.status);
                continue;
            }

            match self.engine.dispatch(task).await {
                Ok(outcome) if outcome.is_done() => report.done += 1,
                Ok(_) => report.failed += 1,
                Err(e) => {
                    report.errored += 1;
                    error!("Task {} handler error: {}", task.id, e);
                    let result = json!({ "reason": format!("handler error: {}", e) });
                    if let Err(e) = control_plane
                        .update_task_status(&task.id, TaskStatus::Failed, Some(result))
                        .await
                    {
                        warn!("Could not report handler error for task {}: {}", task.id, e);
                    }
                }
            }
        }

        Ok(report)
    }

    /// Tick, then sleep, until stopped or `shutdown_signal` resolves
    pub async fn run<S, F>(
        &self,
        sleep_fn: S,
        mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
    ) where
        S: Fn(Duration) -> F,
        F: Future<Output = ()>,
    {
        info!(
            "Task poller starting (interval {:?})...",
            self.options.interval
        );

        while !self.is_stopped() {
            match self.tick().await {
                Ok(report) if report.fetched > 0 => info!(
                    "Tick: {} fetched, {} done, {} failed, {} errored",
                    report.fetched, report.done, report.failed, report.errored
                ),
                Ok(_) => {}
                Err(e) => error!("Tick failed: {}", e),
            }

            tokio::select! {
                _ = &mut shutdown_signal => {
                    self.stop();
                }
                _ = sleep_fn(self.options.interval) => {}
            }
        }

        info!("Task poller shutting down...");
    }
}
