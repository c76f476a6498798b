//! Node and fleet types.
//!
//! A fleet is never stored; it is derived on demand from the provider
//! inventory by name pattern. The naming convention carries the role:
//! `<cluster>-master` for the singleton coordinator and
//! `<cluster>-worker-<index>` for workers. Worker indices are strictly
//! increasing and never reused; removal does not renumber survivors.

use std::collections::BTreeSet;

use flotilla_provider::InstanceId;
use serde::Serialize;

/// One provisioned node, read fresh from the inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    /// Provider id.
    pub id: InstanceId,

    /// Assigned name label.
    pub name: String,

    /// Resolved network address.
    pub addr: String,
}

/// Node role within the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Coordinator,
    Worker,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Coordinator => write!(f, "coordinator"),
            Self::Worker => write!(f, "worker"),
        }
    }
}

/// Name of the singleton coordinator node.
pub fn coordinator_name(cluster: &str) -> String {
    format!("{}-master", cluster)
}

/// Name of the worker with the given index.
pub fn worker_name(cluster: &str, index: u32) -> String {
    format!("{}-worker-{}", cluster, index)
}

/// Extract the worker index from a node name, if it matches this cluster's
/// worker pattern.
pub fn worker_index(cluster: &str, name: &str) -> Option<u32> {
    let suffix = name.strip_prefix(cluster)?.strip_prefix("-worker-")?;
    suffix.parse().ok()
}

/// Derived view of one cluster's nodes.
#[derive(Debug, Clone, Default)]
pub struct Fleet {
    /// The coordinator, if one exists.
    pub coordinator: Option<Node>,

    /// Workers with their indices, sorted by index ascending.
    pub workers: Vec<(u32, Node)>,
}

impl Fleet {
    /// Classify nodes by the cluster's name patterns. Nodes that match
    /// neither pattern are not part of the fleet and are dropped.
    pub fn from_nodes(cluster: &str, nodes: Vec<Node>) -> Self {
        let master = coordinator_name(cluster);
        let mut coordinator = None;
        let mut workers = Vec::new();

        for node in nodes {
            if node.name == master {
                coordinator = Some(node);
            } else if let Some(index) = worker_index(cluster, &node.name) {
                workers.push((index, node));
            }
        }

        workers.sort_by_key(|(index, _)| *index);
        Self {
            coordinator,
            workers,
        }
    }

    /// Highest worker index in use, 0 when there are no workers.
    pub fn max_worker_index(&self) -> u32 {
        self.workers.last().map(|(index, _)| *index).unwrap_or(0)
    }

    /// Names for the next `count` workers, starting one past the current
    /// maximum index.
    pub fn next_worker_names(&self, cluster: &str, count: usize) -> BTreeSet<String> {
        let start = self.max_worker_index() + 1;
        (0..count as u32)
            .map(|offset| worker_name(cluster, start + offset))
            .collect()
    }

    /// The `count` highest-indexed workers, highest first.
    pub fn highest_workers(&self, count: usize) -> Vec<&Node> {
        self.workers
            .iter()
            .rev()
            .take(count)
            .map(|(_, node)| node)
            .collect()
    }

    /// Ids of every node in the fleet.
    pub fn all_ids(&self) -> BTreeSet<InstanceId> {
        self.workers
            .iter()
            .map(|(_, node)| node.id.clone())
            .chain(self.coordinator.iter().map(|node| node.id.clone()))
            .collect()
    }

    /// Whether the fleet has no nodes at all.
    pub fn is_empty(&self) -> bool {
        self.coordinator.is_none() && self.workers.is_empty()
    }
}
