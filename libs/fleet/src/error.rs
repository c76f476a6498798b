//! Error taxonomy for fleet operations.
//!
//! Transient provider errors never surface here; they are absorbed by
//! bounded retries inside the lifecycle manager. Everything in this enum is
//! fatal to the operation that returned it.

use flotilla_provider::{InstanceId, ProviderError};
use thiserror::Error;

/// Result type for fleet operations.
pub type FleetResult<T> = Result<T, FleetError>;

/// Fatal errors surfaced by the fleet core.
#[derive(Debug, Error)]
pub enum FleetError {
    /// Convergence could not reach the target node count within the
    /// attempt budget. Nodes realized along the way are left running.
    #[error("provisioned {realized} of {requested} nodes before exhausting the attempt budget")]
    Provision { requested: usize, realized: usize },

    /// Instances were still listed after the termination confirmation
    /// budget ran out.
    #[error("termination unconfirmed for {} instance(s): {}", pending.len(), format_ids(pending))]
    TerminationTimeout { pending: Vec<InstanceId> },

    /// A node-level setup step failed.
    #[error("bootstrap failed on {node}: {reason}")]
    Bootstrap { node: String, reason: String },

    /// A coordinator already exists for this cluster.
    #[error("cluster already has a coordinator")]
    CoordinatorExists,

    /// The operation requires a coordinator and none exists.
    #[error("cluster has no coordinator")]
    NoCoordinator,

    /// A provider call failed permanently.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
}

fn format_ids(ids: &[InstanceId]) -> String {
    ids.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_termination_timeout_lists_pending_ids() {
        let err = FleetError::TerminationTimeout {
            pending: vec![InstanceId::new("i-1"), InstanceId::new("i-2")],
        };
        assert_eq!(
            err.to_string(),
            "termination unconfirmed for 2 instance(s): i-1, i-2"
        );
    }
}
