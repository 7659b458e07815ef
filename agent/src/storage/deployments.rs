//! Durable record of the deployments this satellite serves

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use futures::future::join_all;
use openapi_client::models::{DeploymentStatus, ResourceId};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::deploy::runtime::ContainerRuntime;
use crate::errors::AgentError;
use crate::filesys::file::File;
use crate::http::control_plane::ControlPlane;
use crate::models::deployment::LocalDeployment;

/// On-disk shape: deployment id -> entry
pub type DeploymentMap = BTreeMap<String, LocalDeployment>;

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Active deployments the control plane reported with an inference URL
    pub active: usize,
    /// Entries in the store after the pass
    pub kept: usize,
    /// Previously stored entries that are gone after the pass
    pub dropped: usize,
}

/// Writer-side bookkeeping, guarded together with the file
#[derive(Debug, Default)]
struct Journal {
    /// Bumped by every mutation
    revision: u64,
    /// Revision at which each id was last added or removed
    touched: HashMap<String, u64>,
    /// Start revisions of reconciliation passes in progress
    syncs: Vec<u64>,
}

impl Journal {
    fn touch(&mut self, deployment_id: &str) {
        self.revision += 1;
        if !self.syncs.is_empty() {
            self.touched.insert(deployment_id.to_string(), self.revision);
        }
    }

    fn touched_since(&self, deployment_id: &str, revision: u64) -> bool {
        self.touched
            .get(deployment_id)
            .is_some_and(|&touched| touched > revision)
    }

    fn finish_sync(&mut self, started: u64) {
        if let Some(pos) = self.syncs.iter().position(|&s| s == started) {
            self.syncs.swap_remove(pos);
        }
        match self.syncs.iter().min() {
            Some(&oldest) => self.touched.retain(|_, &mut rev| rev > oldest),
            None => self.touched.clear(),
        }
    }
}

/// JSON-file backed store of [`LocalDeployment`] entries.
///
/// Every mutation reads the current file, applies the change and atomically
/// replaces the file, so a crash mid-write leaves the previous state intact.
/// Reads never fail: a missing or unreadable file is an empty store.
///
/// Reconciliation runs its health checks without holding the journal lock.
/// Ids added or removed meanwhile keep their newer state when it merges.
pub struct LocalDeploymentStore {
    file: File,
    journal: Mutex<Journal>,
}

impl LocalDeploymentStore {
    pub fn new(file: File) -> Self {
        Self {
            file,
            journal: Mutex::new(Journal::default()),
        }
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    /// Current contents; missing or malformed files read as empty
    pub async fn read(&self) -> DeploymentMap {
        if !self.file.exists().await {
            return DeploymentMap::new();
        }
        match self.file.read_json().await {
            Ok(map) => map,
            Err(e) => {
                warn!(
                    "Ignoring unreadable deployment state {}: {}",
                    self.file.path().display(),
                    e
                );
                DeploymentMap::new()
            }
        }
    }

    async fn write(&self, map: &DeploymentMap) -> Result<(), AgentError> {
        self.file.write_json_atomic(map).await
    }

    /// Insert or replace the entry for `deployment.deployment_id`
    pub async fn add(&self, deployment: LocalDeployment) -> Result<(), AgentError> {
        let mut journal = self.journal.lock().await;
        let mut map = self.read().await;
        debug!(
            "Recording deployment {} at {}",
            deployment.deployment_id, deployment.inference_url
        );
        let id = deployment.deployment_id.to_string();
        journal.touch(&id);
        map.insert(id, deployment);
        self.write(&map).await
    }

    pub async fn get(&self, deployment_id: &str) -> Option<LocalDeployment> {
        self.read().await.remove(deployment_id)
    }

    /// All recorded deployments, ordered by id
    pub async fn list_active(&self) -> Vec<LocalDeployment> {
        self.read().await.into_values().collect()
    }

    /// Remove an entry; returns whether it existed
    pub async fn remove(&self, deployment_id: &ResourceId) -> Result<bool, AgentError> {
        let mut journal = self.journal.lock().await;
        let mut map = self.read().await;
        journal.touch(deployment_id.as_str());
        if map.remove(deployment_id.as_str()).is_none() {
            return Ok(false);
        }
        self.write(&map).await?;
        Ok(true)
    }

    /// Rebuild the store from the control plane's view.
    ///
    /// Active deployments with an inference URL are probed on `/healthz`
    /// concurrently; exactly the ones that answer within `probe_timeout` are
    /// kept. Ids added or removed after the pass started are left as they are
    /// now. A failure to list deployments leaves the store untouched.
    pub async fn sync_deployments(
        &self,
        control_plane: &dyn ControlPlane,
        runtime: &dyn ContainerRuntime,
        probe_timeout: Duration,
    ) -> Result<SyncReport, AgentError> {
        let started = {
            let mut journal = self.journal.lock().await;
            let revision = journal.revision;
            journal.syncs.push(revision);
            revision
        };

        let result = self
            .reconcile(control_plane, runtime, probe_timeout, started)
            .await;
        self.journal.lock().await.finish_sync(started);
        result
    }

    async fn reconcile(
        &self,
        control_plane: &dyn ControlPlane,
        runtime: &dyn ContainerRuntime,
        probe_timeout: Duration,
        started: u64,
    ) -> Result<SyncReport, AgentError> {
        let remote = control_plane.list_deployments().await?;
        let candidates: Vec<_> = remote
            .into_iter()
            .filter(|d| d.status == DeploymentStatus::Active)
            .filter_map(|d| {
                let url = d.inference_url.filter(|u| !u.is_empty())?;
                Some((d.id, url))
            })
            .collect();

        let checks = candidates.iter().map(|(id, url)| async move {
            let healthz = format!("{}/healthz", url.trim_end_matches('/'));
            let healthy = runtime.wait_http_ok(&healthz, probe_timeout).await;
            if !healthy {
                info!("Deployment {} is not answering at {}", id, url);
            }
            healthy
        });
        let health = join_all(checks).await;

        let journal = self.journal.lock().await;
        let previous = self.read().await;
        let mut next = DeploymentMap::new();
        for ((id, url), healthy) in candidates.iter().zip(health) {
            if !healthy || journal.touched_since(id.as_str(), started) {
                continue;
            }
            let container_id = previous
                .get(id.as_str())
                .and_then(|existing| existing.container_id.clone());
            next.insert(
                id.to_string(),
                LocalDeployment::new(id.clone(), container_id, url.clone()),
            );
        }
        for (id, deployment) in &previous {
            if journal.touched_since(id, started) {
                debug!("Keeping deployment {} changed during reconciliation", id);
                next.insert(id.clone(), deployment.clone());
            }
        }

        let report = SyncReport {
            active: candidates.len(),
            kept: next.len(),
            dropped: previous.keys().filter(|id| !next.contains_key(*id)).count(),
        };
        self.write(&next).await?;
        Ok(report)
    }
}
