//! Reconciliation worker keeping the local deployment store in line with
//! the control plane

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::app::context::AgentContext;
use crate::storage::deployments::SyncReport;

/// Reconciler worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Delay between reconciliation passes
    pub interval: Duration,

    /// Health probe timeout per deployment
    pub probe_timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

/// One reconciliation pass; failures are logged and yield `None`
pub async fn reconcile_once(ctx: &AgentContext, options: &Options) -> Option<SyncReport> {
    match ctx
        .store
        .sync_deployments(
            ctx.control_plane.as_ref(),
            ctx.runtime.as_ref(),
            options.probe_timeout,
        )
        .await
    {
        Ok(report) => {
            if report.dropped > 0 {
                info!(
                    "Reconciled deployments: {} kept, {} dropped",
                    report.kept, report.dropped
                );
            } else {
                debug!("Reconciled deployments: {} kept", report.kept);
            }
            Some(report)
        }
        Err(e) => {
            error!("Deployment reconciliation failed: {}", e);
            None
        }
    }
}

/// Run the reconciler worker; the first pass happens immediately
pub async fn run<S, F>(
    options: &Options,
    ctx: &AgentContext,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Reconciler worker starting...");

    loop {
        reconcile_once(ctx, options).await;

        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Reconciler worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {}
        }
    }
}
