//! Node lifecycle convergence.
//!
//! The lifecycle manager converges a target named set of instances into
//! existence and removes instances with termination confirmation. Two
//! rules hold everywhere:
//!
//! - No write is trusted without a subsequent read-back through the
//!   directory.
//! - Every wait is bounded; exhausting a budget is a fatal error.
//!
//! Provisioning works around a provider whose batch create does not always
//! yield the requested number of usable instances: each round tops up the
//! remaining deficit instead of restarting from zero, and instances that
//! fail to realize (tagging, address) are terminated immediately so nothing
//! half-configured is left running and billing.

use std::collections::BTreeSet;
use std::sync::Arc;

use flotilla_provider::{InstanceId, Provider};
use tracing::{debug, info, warn};

use crate::config::FleetConfig;
use crate::directory::NodeDirectory;
use crate::error::{FleetError, FleetResult};
use crate::node::{Node, Role};

/// Converges instances to a target named set and back out of existence.
pub struct LifecycleManager {
    config: FleetConfig,
    provider: Arc<dyn Provider>,
    directory: NodeDirectory,
}

impl LifecycleManager {
    /// Create a manager for one deployment.
    pub fn new(config: FleetConfig, provider: Arc<dyn Provider>) -> Self {
        let directory = NodeDirectory::new(&config, Arc::clone(&provider));
        Self {
            config,
            provider,
            directory,
        }
    }

    /// The directory this manager reads through.
    pub fn directory(&self) -> &NodeDirectory {
        &self.directory
    }

    /// Converge until nodes named `target_names` exist, or the attempt
    /// budget runs out.
    ///
    /// Nodes already existing under a target name count toward the target
    /// and are never re-created. Each round issues one batch create for the
    /// remaining deficit; instances that fail to realize are terminated and
    /// the next round tops up what is still missing. On budget exhaustion
    /// the call fails with [`FleetError::Provision`], leaving nodes that
    /// did realize in place.
    pub async fn ensure_nodes(
        &self,
        role: Role,
        target_names: &BTreeSet<String>,
    ) -> FleetResult<Vec<Node>> {
        let mut accepted = self.existing_targets(target_names).await?;
        let mut attempts_left = self.config.retries.provision_attempts.max(1);

        loop {
            let have: BTreeSet<&str> = accepted.iter().map(|n| n.name.as_str()).collect();
            let deficit: Vec<&String> = target_names
                .iter()
                .filter(|name| !have.contains(name.as_str()))
                .collect();

            if deficit.is_empty() {
                return Ok(accepted);
            }
            if attempts_left == 0 {
                warn!(
                    requested = target_names.len(),
                    realized = accepted.len(),
                    "Provisioning attempt budget exhausted"
                );
                return Err(FleetError::Provision {
                    requested: target_names.len(),
                    realized: accepted.len(),
                });
            }
            attempts_left -= 1;

            info!(
                role = %role,
                deficit = deficit.len(),
                attempts_left,
                "Provisioning round"
            );

            let created = self.create_batch(role, deficit.len()).await?;

            // Pairing is arbitrary: names are interchangeable labels
            // assigned after the fact. Under-delivery simply leaves the
            // tail of the deficit for the next round.
            let mut failed: BTreeSet<InstanceId> = BTreeSet::new();
            for (id, name) in created.into_iter().zip(deficit) {
                match self.realize(&id, name).await {
                    Ok(node) => {
                        info!(id = %node.id, name = %node.name, addr = %node.addr, "Node realized");
                        accepted.push(node);
                    }
                    Err(reason) => {
                        warn!(id = %id, name = %name, reason = %reason, "Node failed to realize");
                        failed.insert(id);
                    }
                }
            }

            // Compensation: a partially-named, addressless instance must
            // never be left running.
            if !failed.is_empty() {
                info!(count = failed.len(), "Terminating instances that failed to realize");
                self.remove_nodes(&failed).await?;
            }
        }
    }

    /// Remove the given instances, confirming they actually disappear.
    ///
    /// Idempotent: ids that are already gone are skipped. Returns only once
    /// the directory no longer lists any requested id, or fails with
    /// [`FleetError::TerminationTimeout`] when the confirmation budget runs
    /// out first.
    pub async fn remove_nodes(&self, ids: &BTreeSet<InstanceId>) -> FleetResult<()> {
        let listing = self.directory.list().await?;
        let live: Vec<InstanceId> = listing
            .iter()
            .map(|d| d.id.clone())
            .filter(|id| ids.contains(id))
            .collect();

        if live.is_empty() {
            debug!("Requested instances already gone");
            return Ok(());
        }

        info!(count = live.len(), "Terminating instances");
        self.terminate_batch(&live).await?;

        let mut remaining = live;
        for _ in 0..self.config.retries.terminate_attempts.max(1) {
            tokio::time::sleep(self.config.retries.poll_delay()).await;

            match self.directory.list().await {
                Ok(listing) => {
                    let listed: BTreeSet<&InstanceId> = listing.iter().map(|d| &d.id).collect();
                    remaining.retain(|id| listed.contains(id));
                    if remaining.is_empty() {
                        info!("Termination confirmed");
                        return Ok(());
                    }
                    debug!(remaining = remaining.len(), "Awaiting termination");
                }
                Err(e) => {
                    warn!(error = %e, "Listing failed during termination confirmation");
                }
            }
        }

        Err(FleetError::TerminationTimeout { pending: remaining })
    }

    /// Nodes already existing under a target name. Only instances with an
    /// assigned address count; anything else is still in flight and the
    /// caller's precondition makes colliding names impossible.
    async fn existing_targets(&self, target_names: &BTreeSet<String>) -> FleetResult<Vec<Node>> {
        let listing = self.directory.list().await?;
        Ok(listing
            .iter()
            .filter(|d| {
                d.name
                    .as_ref()
                    .is_some_and(|name| target_names.contains(name))
            })
            .filter_map(|d| self.directory.node_of(d))
            .collect())
    }

    /// One batch create. A transient failure yields an empty round (the
    /// next round tops up); only permanent rejection aborts convergence.
    async fn create_batch(&self, role: Role, count: usize) -> FleetResult<Vec<InstanceId>> {
        let spec = self.config.launch_spec(role);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.provider.create_instances(&spec, count).await {
                Ok(ids) => {
                    if ids.len() < count {
                        warn!(
                            requested = count,
                            delivered = ids.len(),
                            "Provider under-delivered batch create"
                        );
                    }
                    return Ok(ids);
                }
                Err(e) if e.is_transient() && attempt < self.config.retries.request_attempts => {
                    warn!(error = %e, attempt, "Batch create failed; retrying");
                    tokio::time::sleep(self.config.retries.poll_delay()).await;
                }
                Err(e) if e.is_transient() => {
                    warn!(error = %e, "Batch create kept failing; deferring to next round");
                    return Ok(Vec::new());
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// One batch terminate with bounded transient retry.
    async fn terminate_batch(&self, ids: &[InstanceId]) -> FleetResult<()> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.provider.terminate_instances(ids).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < self.config.retries.request_attempts => {
                    warn!(error = %e, attempt, "Terminate request failed; retrying");
                    tokio::time::sleep(self.config.retries.poll_delay()).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Turn a freshly created instance into a usable node: apply the name
    /// label, then wait for the instance to reappear in the directory with
    /// an address. Any failure demotes the instance; the error string is
    /// the demotion reason for the log.
    async fn realize(&self, id: &InstanceId, name: &str) -> Result<Node, String> {
        self.tag_with_retry(id, name).await?;

        let addr = self.await_address(id).await?;
        Ok(Node {
            id: id.clone(),
            name: name.to_string(),
            addr,
        })
    }

    async fn tag_with_retry(&self, id: &InstanceId, name: &str) -> Result<(), String> {
        let budget = self.config.retries.tag_attempts.max(1);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.provider.tag_instance(id, name).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < budget => {
                    debug!(id = %id, attempt, error = %e, "Tagging failed; retrying");
                    tokio::time::sleep(self.config.retries.poll_delay()).await;
                }
                Err(e) => return Err(format!("tagging failed: {}", e)),
            }
        }
    }

    /// Poll the directory until the instance shows up with its configured
    /// address.
    async fn await_address(&self, id: &InstanceId) -> Result<String, String> {
        for _ in 0..self.config.retries.address_attempts.max(1) {
            match self.directory.list().await {
                Ok(listing) => {
                    let found = listing.iter().find(|d| &d.id == id);
                    if let Some(addr) =
                        found.and_then(|d| d.addr(self.config.use_public_addr))
                    {
                        return Ok(addr.to_string());
                    }
                }
                Err(e) => {
                    debug!(id = %id, error = %e, "Listing failed while awaiting address");
                }
            }
            tokio::time::sleep(self.config.retries.poll_delay()).await;
        }

        Err("no address within the attempt budget".to_string())
    }
}
