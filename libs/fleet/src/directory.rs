//! Read-through view over the provider's instance inventory.

use std::sync::Arc;

use flotilla_provider::{InstanceDescriptor, Provider};
use tracing::debug;

use crate::config::FleetConfig;
use crate::error::FleetResult;
use crate::node::Node;

/// The single path by which any component observes reality.
///
/// Every call issues a fresh provider query filtered to this deployment's
/// access credential; nothing is cached. Only fully terminated instances
/// are excluded, so instances on their way out stay visible until the
/// provider confirms they are gone.
pub struct NodeDirectory {
    provider: Arc<dyn Provider>,
    key_name: String,
    use_public_addr: bool,
}

impl NodeDirectory {
    /// Create a directory for one deployment.
    pub fn new(config: &FleetConfig, provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            key_name: config.key_name.clone(),
            use_public_addr: config.use_public_addr,
        }
    }

    /// All non-terminated instances of this deployment, raw.
    pub async fn list(&self) -> FleetResult<Vec<InstanceDescriptor>> {
        let listing = self.provider.list_instances(&self.key_name).await?;
        let live: Vec<InstanceDescriptor> = listing
            .into_iter()
            .filter(|d| !d.state.is_terminal())
            .collect();

        debug!(count = live.len(), "Listed live instances");
        Ok(live)
    }

    /// All instances that are already usable as nodes: named, with their
    /// configured address assigned.
    pub async fn nodes(&self) -> FleetResult<Vec<Node>> {
        let listing = self.list().await?;
        Ok(listing.iter().filter_map(|d| self.node_of(d)).collect())
    }

    /// View a descriptor as a node, if it is named and addressed.
    pub fn node_of(&self, descriptor: &InstanceDescriptor) -> Option<Node> {
        let name = descriptor.name.clone()?;
        let addr = descriptor.addr(self.use_public_addr)?;
        Some(Node {
            id: descriptor.id.clone(),
            name,
            addr: addr.to_string(),
        })
    }
}
