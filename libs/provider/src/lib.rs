//! Cloud provider interface for flotilla.
//!
//! This crate defines the boundary between the fleet logic and the cloud
//! provider that actually owns the instances:
//!
//! - [`Provider`]: the four calls the fleet needs (create, tag, list,
//!   terminate). Every call may fail transiently; callers own their retry
//!   policy and use [`ProviderError::is_transient`] to decide.
//! - [`HttpProvider`]: client for the provider's HTTP JSON API.
//! - [`MockProvider`]: scriptable in-memory double for tests and development.
//!
//! The provider is the sole source of truth for instance existence and
//! addressing. Nothing in this crate caches inventory; each `list_instances`
//! call issues a fresh query.

mod error;
mod http;
mod mock;
mod types;

pub use error::ProviderError;
pub use http::HttpProvider;
pub use mock::MockProvider;
pub use types::{InstanceDescriptor, InstanceId, InstanceState, LaunchSpec};

use async_trait::async_trait;

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Cloud provider instance operations.
///
/// Implementations must be safe to share across tasks; the fleet holds one
/// behind an `Arc<dyn Provider>`.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Request `count` new instances for the given launch spec.
    ///
    /// Returns the ids the provider accepted. The provider may silently
    /// deliver fewer instances than requested; callers must reconcile the
    /// returned ids against a subsequent `list_instances`.
    async fn create_instances(
        &self,
        spec: &LaunchSpec,
        count: usize,
    ) -> ProviderResult<Vec<InstanceId>>;

    /// Assign the name label to an instance.
    async fn tag_instance(&self, id: &InstanceId, name: &str) -> ProviderResult<()>;

    /// List all instances carrying the given access credential.
    ///
    /// Includes instances in every lifecycle state; filtering out terminal
    /// states is the caller's concern.
    async fn list_instances(&self, key_name: &str) -> ProviderResult<Vec<InstanceDescriptor>>;

    /// Request termination of the given instances.
    ///
    /// Termination is eventually consistent: a successful return means the
    /// request was accepted, not that the instances are gone. Callers
    /// confirm via `list_instances`.
    async fn terminate_instances(&self, ids: &[InstanceId]) -> ProviderResult<()>;
}
