//! Periodic controller tests

use std::sync::Arc;
use std::time::Duration;

use openapi_client::models::TaskStatus;
use satellite_agent::tasks::TaskEngine;
use satellite_agent::workers::poller::{Options, PeriodicController, TickReport};
use serde_json::{json, Value};

use crate::common::{deployment, task, Harness};

fn controller(h: &Harness) -> PeriodicController {
    PeriodicController::new(
        TaskEngine::new(h.ctx.clone()),
        Options {
            interval: Duration::from_millis(10),
        },
    )
}

#[tokio::test]
async fn tick_dispatches_every_pending_task() {
    let h = Harness::new();
    h.control_plane.with(|s| {
        s.deployments.push(deployment(7, 70, &[]));
        s.tasks.push(task(1, "pairing", Value::Null));
        s.tasks.push(task(2, "deploy", json!({"deployment_id": 7})));
        s.tasks.push(task(3, "deploy", json!({})));
    });

    let report = controller(&h).tick().await.unwrap();

    assert_eq!(
        report,
        TickReport {
            fetched: 3,
            done: 2,
            failed: 1,
            errored: 0,
            skipped: false,
        }
    );
    assert_eq!(h.control_plane.terminal_update("1").status, TaskStatus::Done);
    assert_eq!(h.control_plane.terminal_update("2").status, TaskStatus::Done);
    assert_eq!(h.control_plane.terminal_update("3").status, TaskStatus::Failed);
}

#[tokio::test]
async fn handler_error_is_isolated_to_its_task() {
    let h = Harness::new();
    h.control_plane.with(|s| {
        s.fail_pair = true;
        s.tasks.push(task(1, "pairing", Value::Null));
        s.tasks.push(task(2, "undeploy", json!({"deployment_id": 5})));
    });

    let report = controller(&h).tick().await.unwrap();

    assert_eq!(report.errored, 1);
    assert_eq!(report.done, 1);

    let failed = h.control_plane.terminal_update("1");
    assert_eq!(failed.status, TaskStatus::Failed);
    let reason = failed.result.unwrap()["reason"].as_str().unwrap().to_string();
    assert!(reason.starts_with("handler error: "), "{}", reason);
    assert!(reason.contains("pairing unavailable"), "{}", reason);

    assert_eq!(h.control_plane.terminal_update("2").status, TaskStatus::Done);
}

#[tokio::test]
async fn failure_to_report_handler_error_is_swallowed() {
    let h = Harness::new();
    h.control_plane.with(|s| {
        s.reject_running_for.insert("1".to_string());
        s.tasks.push(task(1, "pairing", Value::Null));
        s.tasks.push(task(2, "pairing", Value::Null));
    });

    let report = controller(&h).tick().await.unwrap();

    // Task 1 could not be marked running; its failed report went through.
    assert_eq!(report.errored, 1);
    assert_eq!(report.done, 1);
    assert_eq!(h.control_plane.terminal_update("2").status, TaskStatus::Done);

    h.control_plane.with(|s| {
        s.fail_status_updates = true;
        s.tasks.push(task(3, "pairing", Value::Null));
    });
    let report = controller(&h).tick().await.unwrap();
    assert_eq!(report.errored, 1);
}

#[tokio::test]
async fn list_failure_is_a_tick_error() {
    let h = Harness::new();
    h.control_plane.with(|s| s.fail_list_tasks = true);

    assert!(controller(&h).tick().await.is_err());
}

#[tokio::test]
async fn completed_tasks_are_not_picked_up_again() {
    let h = Harness::new();
    h.control_plane
        .with(|s| s.tasks.push(task(1, "pairing", Value::Null)));
    let controller = controller(&h);

    controller.tick().await.unwrap();
    let second = controller.tick().await.unwrap();

    assert_eq!(second.fetched, 0);
    assert_eq!(h.control_plane.with(|s| s.paired.len()), 1);
}

#[tokio::test]
async fn run_survives_tick_errors_until_shutdown() {
    let h = Harness::new();
    h.control_plane.with(|s| s.fail_list_tasks = true);
    let controller = Arc::new(controller(&h));

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let runner = {
        let controller = controller.clone();
        tokio::spawn(async move {
            controller
                .run(
                    tokio::time::sleep,
                    Box::pin(async move {
                        let _ = rx.await;
                    }),
                )
                .await;
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    h.control_plane.with(|s| {
        s.fail_list_tasks = false;
        s.tasks.push(task(1, "pairing", Value::Null));
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), runner)
        .await
        .unwrap()
        .unwrap();

    assert!(controller.is_stopped());
    assert_eq!(h.control_plane.terminal_update("1").status, TaskStatus::Done);
}

#[tokio::test]
async fn stop_ends_the_loop_before_the_next_tick() {
    let h = Harness::new();
    let controller = Arc::new(controller(&h));
    controller.stop();

    tokio::time::timeout(
        Duration::from_secs(1),
        controller.run(tokio::time::sleep, Box::pin(std::future::pending::<()>())),
    )
    .await
    .unwrap();

    assert!(h.control_plane.with(|s| s.status_updates.is_empty()));
}

#[tokio::test]
async fn overlapping_tick_is_skipped() {
    let h = Harness::new();
    h.control_plane.with(|s| {
        s.deployments.push(deployment(7, 70, &[]));
        s.tasks.push(task(1, "deploy", json!({"deployment_id": 7})));
    });
    let controller = Arc::new(controller(&h));

    // The first tick still holds the guard while it waits on store file IO.
    let (first, second) = tokio::join!(controller.tick(), controller.tick());
    let reports = [first.unwrap(), second.unwrap()];

    assert_eq!(reports.iter().filter(|r| r.skipped).count(), 1);
    assert_eq!(h.runtime.with(|s| s.runs.len()), 1);
}
