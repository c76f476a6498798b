//! Fleet bootstrap orchestration.
//!
//! The orchestrator drives whole-fleet operations on top of the lifecycle
//! manager: coordinator bring-up, concurrent worker bring-up, cluster
//! restart, worker removal, fleet destruction, job submission. Transitions
//! happen only on explicit operator calls; there is no background
//! reconciliation loop.
//!
//! Worker bootstraps are the only concurrent flow. They run on a bounded
//! task pool, are never cancelled early, and the aggregate reports the
//! first failure in submission order once every sibling has finished, so
//! partial successes remain visible in the fleet.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use flotilla_provider::{InstanceId, Provider};
use flotilla_remote::RemoteExec;
use futures_util::future::join_all;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::bootstrap::NodeBootstrap;
use crate::config::FleetConfig;
use crate::error::{FleetError, FleetResult};
use crate::lifecycle::LifecycleManager;
use crate::node::{coordinator_name, worker_index, Fleet, Node, Role};

/// Drives operator-facing fleet operations.
pub struct FleetOrchestrator {
    config: FleetConfig,
    lifecycle: LifecycleManager,
    bootstrap: Arc<NodeBootstrap>,
}

impl FleetOrchestrator {
    /// Create an orchestrator for one deployment.
    pub fn new(
        config: FleetConfig,
        provider: Arc<dyn Provider>,
        exec: Arc<dyn RemoteExec>,
    ) -> Self {
        let lifecycle = LifecycleManager::new(config.clone(), provider);
        let bootstrap = Arc::new(NodeBootstrap::new(config.clone(), exec));
        Self {
            config,
            lifecycle,
            bootstrap,
        }
    }

    /// Current fleet, derived fresh from the inventory.
    pub async fn fleet(&self) -> FleetResult<Fleet> {
        let nodes = self.lifecycle.directory().nodes().await?;
        Ok(Fleet::from_nodes(&self.config.cluster_name, nodes))
    }

    /// Create and bootstrap the coordinator.
    ///
    /// Fails with [`FleetError::CoordinatorExists`] if one is already
    /// listed; precondition violations never tear anything down since no
    /// resources were created.
    pub async fn create_coordinator(&self) -> FleetResult<Node> {
        let fleet = self.fleet().await?;
        if fleet.coordinator.is_some() {
            return Err(FleetError::CoordinatorExists);
        }

        match self.bring_up_coordinator().await {
            Ok(node) => Ok(node),
            Err(e) => Err(self.fail_operation(e).await),
        }
    }

    async fn bring_up_coordinator(&self) -> FleetResult<Node> {
        let name = coordinator_name(&self.config.cluster_name);
        let targets = BTreeSet::from([name]);

        let mut nodes = self
            .lifecycle
            .ensure_nodes(Role::Coordinator, &targets)
            .await?;
        let node = nodes.pop().ok_or(FleetError::Provision {
            requested: 1,
            realized: 0,
        })?;

        self.bootstrap.coordinator_sequence(&node).await?;

        info!(name = %node.name, addr = %node.addr, "Coordinator ready");
        Ok(node)
    }

    /// Provision and bootstrap `count` new workers.
    ///
    /// New workers get indices strictly past the current maximum. All
    /// bootstraps run concurrently on the bounded pool and every unit runs
    /// to completion before the aggregate outcome is decided.
    pub async fn add_workers(&self, count: usize) -> FleetResult<Vec<Node>> {
        let fleet = self.fleet().await?;
        let coordinator = fleet.coordinator.clone().ok_or(FleetError::NoCoordinator)?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let names = fleet.next_worker_names(&self.config.cluster_name, count);
        match self.bring_up_workers(&coordinator, &names).await {
            Ok(nodes) => Ok(nodes),
            Err(e) => Err(self.fail_operation(e).await),
        }
    }

    async fn bring_up_workers(
        &self,
        coordinator: &Node,
        names: &BTreeSet<String>,
    ) -> FleetResult<Vec<Node>> {
        let mut workers = self.lifecycle.ensure_nodes(Role::Worker, names).await?;

        // Submission order is worker-index order; it also decides which
        // error an aggregate failure reports.
        workers.sort_by_key(|n| {
            worker_index(&self.config.cluster_name, &n.name).unwrap_or(u32::MAX)
        });

        let pool = Arc::new(Semaphore::new(self.config.bootstrap_concurrency.max(1)));
        let mut handles = Vec::with_capacity(workers.len());
        for node in &workers {
            let permit = Arc::clone(&pool).acquire_owned().await.map_err(|_| {
                FleetError::Bootstrap {
                    node: node.name.clone(),
                    reason: "bootstrap pool closed".to_string(),
                }
            })?;
            let bootstrap = Arc::clone(&self.bootstrap);
            let node = node.clone();
            let coordinator_addr = coordinator.addr.clone();

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                bootstrap.worker_sequence(&node, &coordinator_addr).await
            }));
        }

        // Wait-for-all barrier; siblings are never cancelled.
        let outcomes = join_all(handles).await;

        let mut first_error = None;
        for (node, outcome) in workers.iter().zip(outcomes) {
            let result = outcome.unwrap_or_else(|e| {
                Err(FleetError::Bootstrap {
                    node: node.name.clone(),
                    reason: format!("bootstrap task aborted: {}", e),
                })
            });

            if let Err(e) = result {
                warn!(node = %node.name, error = %e, "Worker bootstrap failed");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            None => {
                info!(count = workers.len(), "Workers ready");
                Ok(workers)
            }
            Some(e) => Err(e),
        }
    }

    /// Restart every service in the cluster, strictly sequentially.
    ///
    /// Workers must not attempt to join a coordinator that is mid-restart,
    /// so the order is fixed: rewrite env everywhere, stop workers, stop
    /// coordinator, start coordinator, start workers.
    pub async fn restart_cluster(&self) -> FleetResult<()> {
        let fleet = self.fleet().await?;
        let coordinator = fleet.coordinator.clone().ok_or(FleetError::NoCoordinator)?;

        info!(workers = fleet.workers.len(), "Restarting cluster");

        self.bootstrap
            .write_env(&coordinator, &coordinator.addr)
            .await?;
        for (_, worker) in &fleet.workers {
            self.bootstrap.write_env(worker, &coordinator.addr).await?;
        }

        for (_, worker) in &fleet.workers {
            self.bootstrap.stop_worker(worker).await?;
        }
        self.bootstrap.stop_coordinator(&coordinator).await?;

        self.bootstrap.start_coordinator(&coordinator).await?;
        for (_, worker) in &fleet.workers {
            self.bootstrap.start_worker(worker).await?;
        }

        info!("Cluster restarted");
        Ok(())
    }

    /// Remove the `count` highest-indexed workers. Survivor indices are
    /// never renumbered. Returns the removed names.
    pub async fn remove_workers(&self, count: usize) -> FleetResult<Vec<String>> {
        let fleet = self.fleet().await?;
        let victims = fleet.highest_workers(count);
        if victims.is_empty() {
            return Ok(Vec::new());
        }

        let names: Vec<String> = victims.iter().map(|n| n.name.clone()).collect();
        let ids: BTreeSet<InstanceId> = victims.iter().map(|n| n.id.clone()).collect();

        info!(count = names.len(), "Removing workers");
        self.lifecycle.remove_nodes(&ids).await?;
        Ok(names)
    }

    /// Terminate every node of this cluster in one batch. Idempotent on an
    /// empty fleet.
    ///
    /// Selection is by name over the raw listing so instances that never
    /// finished realizing (named but addressless) are removed too.
    pub async fn destroy_fleet(&self) -> FleetResult<()> {
        let listing = self.lifecycle.directory().list().await?;
        let master = coordinator_name(&self.config.cluster_name);
        let ids: BTreeSet<InstanceId> = listing
            .iter()
            .filter(|d| {
                d.name.as_ref().is_some_and(|name| {
                    *name == master
                        || worker_index(&self.config.cluster_name, name).is_some()
                })
            })
            .map(|d| d.id.clone())
            .collect();

        if ids.is_empty() {
            info!("Fleet already empty");
            return Ok(());
        }

        info!(count = ids.len(), "Destroying fleet");
        self.lifecycle.remove_nodes(&ids).await
    }

    /// Upload a job artifact to the coordinator and invoke the runtime's
    /// submit entry point.
    pub async fn submit_job(&self, artifact: &Path, args: &[String]) -> FleetResult<()> {
        let fleet = self.fleet().await?;
        let coordinator = fleet.coordinator.ok_or(FleetError::NoCoordinator)?;

        let remote_path = self.bootstrap.upload_artifact(&coordinator, artifact).await?;
        self.bootstrap.submit(&coordinator, &remote_path, args).await
    }

    /// Apply the configured failure policy to a failed bring-up: tear the
    /// fleet down first when fail-fast teardown is enabled, then hand the
    /// original error back.
    async fn fail_operation(&self, error: FleetError) -> FleetError {
        if !self.config.teardown_on_failure {
            return error;
        }

        warn!(error = %error, "Bring-up failed; tearing down fleet");
        if let Err(teardown_err) = self.destroy_fleet().await {
            warn!(error = %teardown_err, "Teardown after failure also failed");
        }
        error
    }
}
