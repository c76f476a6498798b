//! Scriptable in-memory provider for tests and development.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::ProviderError;
use crate::types::{InstanceDescriptor, InstanceId, InstanceState, LaunchSpec};
use crate::{Provider, ProviderResult};

/// Termination lag meaning "never converges".
const NEVER: u32 = u32::MAX;

#[derive(Debug)]
struct MockInstance {
    serial: u64,
    name: Option<String>,
    key_name: String,
    state: InstanceState,
    private_addr: Option<String>,
    public_addr: Option<String>,
    /// List calls remaining before a shutting-down instance turns terminated.
    remaining_lag: u32,
}

#[derive(Debug, Default)]
struct MockState {
    instances: BTreeMap<InstanceId, MockInstance>,
    next_serial: u64,
    create_requests: Vec<usize>,
    terminate_requests: Vec<Vec<InstanceId>>,
    create_caps: VecDeque<usize>,
    tag_fail_serials: BTreeSet<u64>,
    addressless_serials: BTreeSet<u64>,
    termination_lag: u32,
}

/// Mock provider with failure-injection knobs.
///
/// Instances are numbered by creation ordinal (1-based across the provider's
/// lifetime); the knobs are keyed by that ordinal so tests can script "the
/// third instance ever created fails tagging" without knowing ids upfront.
pub struct MockProvider {
    state: Mutex<MockState>,
}

impl MockProvider {
    /// Create a well-behaved mock: full delivery, instant tagging,
    /// immediate addresses, termination visible after one poll.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
        }
    }

    /// Cap the number of instances delivered by successive create calls.
    ///
    /// Each create call pops one cap; once the script is exhausted the mock
    /// delivers in full again.
    pub fn with_create_caps(self, caps: impl IntoIterator<Item = usize>) -> Self {
        self.state.lock().unwrap().create_caps = caps.into_iter().collect();
        self
    }

    /// Make tagging fail persistently for the given creation ordinals.
    pub fn with_tag_failures(self, serials: impl IntoIterator<Item = u64>) -> Self {
        self.state.lock().unwrap().tag_fail_serials = serials.into_iter().collect();
        self
    }

    /// Never assign an address to the given creation ordinals.
    pub fn with_addressless(self, serials: impl IntoIterator<Item = u64>) -> Self {
        self.state.lock().unwrap().addressless_serials = serials.into_iter().collect();
        self
    }

    /// Keep terminating instances visible for `polls` list calls.
    pub fn with_termination_lag(self, polls: u32) -> Self {
        self.state.lock().unwrap().termination_lag = polls;
        self
    }

    /// Accept terminate calls but never let the instances disappear.
    pub fn never_terminating(self) -> Self {
        self.with_termination_lag(NEVER)
    }

    /// Requested counts of every create call so far.
    pub fn create_requests(&self) -> Vec<usize> {
        self.state.lock().unwrap().create_requests.clone()
    }

    /// Id batches of every terminate call so far.
    pub fn terminate_requests(&self) -> Vec<Vec<InstanceId>> {
        self.state.lock().unwrap().terminate_requests.clone()
    }

    /// All ids ever passed to a terminate call.
    pub fn terminated_ids(&self) -> BTreeSet<InstanceId> {
        self.state
            .lock()
            .unwrap()
            .terminate_requests
            .iter()
            .flatten()
            .cloned()
            .collect()
    }

    /// Names of all non-terminated instances.
    pub fn live_names(&self) -> BTreeSet<String> {
        self.state
            .lock()
            .unwrap()
            .instances
            .values()
            .filter(|i| !i.state.is_terminal())
            .filter_map(|i| i.name.clone())
            .collect()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn create_instances(
        &self,
        spec: &LaunchSpec,
        count: usize,
    ) -> ProviderResult<Vec<InstanceId>> {
        let mut state = self.state.lock().unwrap();
        state.create_requests.push(count);

        let cap = state.create_caps.pop_front().unwrap_or(count);
        let delivered = count.min(cap);

        info!(
            requested = count,
            delivered,
            instance_type = %spec.instance_type,
            "[MOCK] Creating instances"
        );

        let mut ids = Vec::with_capacity(delivered);
        for _ in 0..delivered {
            state.next_serial += 1;
            let serial = state.next_serial;
            let id = InstanceId::new(format!("i-{:04}", serial));

            let addressless = state.addressless_serials.contains(&serial);
            state.instances.insert(
                id.clone(),
                MockInstance {
                    serial,
                    name: None,
                    key_name: spec.key_name.clone(),
                    state: InstanceState::Running,
                    private_addr: (!addressless).then(|| format!("10.0.0.{}", serial)),
                    public_addr: (!addressless).then(|| format!("203.0.113.{}", serial)),
                    remaining_lag: 0,
                },
            );
            ids.push(id);
        }

        Ok(ids)
    }

    async fn tag_instance(&self, id: &InstanceId, name: &str) -> ProviderResult<()> {
        let mut state = self.state.lock().unwrap();

        let Some(serial) = state.instances.get(id).map(|instance| instance.serial) else {
            return Err(ProviderError::Api {
                status: 404,
                message: format!("no such instance: {}", id),
            });
        };

        if state.tag_fail_serials.contains(&serial) {
            return Err(ProviderError::Transient(format!(
                "tagging unavailable for {}",
                id
            )));
        }

        debug!(id = %id, name, "[MOCK] Tagging instance");
        let instance = state.instances.get_mut(id).expect("instance present");
        instance.name = Some(name.to_string());
        Ok(())
    }

    async fn list_instances(&self, key_name: &str) -> ProviderResult<Vec<InstanceDescriptor>> {
        let mut state = self.state.lock().unwrap();

        // Advance eventually-consistent terminations by one poll.
        for instance in state.instances.values_mut() {
            if instance.state == InstanceState::ShuttingDown {
                if instance.remaining_lag == 0 {
                    instance.state = InstanceState::Terminated;
                } else if instance.remaining_lag != NEVER {
                    instance.remaining_lag -= 1;
                }
            }
        }

        Ok(state
            .instances
            .iter()
            .filter(|(_, i)| i.key_name == key_name)
            .map(|(id, i)| InstanceDescriptor {
                id: id.clone(),
                name: i.name.clone(),
                key_name: i.key_name.clone(),
                state: i.state,
                private_addr: i.private_addr.clone(),
                public_addr: i.public_addr.clone(),
            })
            .collect())
    }

    async fn terminate_instances(&self, ids: &[InstanceId]) -> ProviderResult<()> {
        let mut state = self.state.lock().unwrap();
        state.terminate_requests.push(ids.to_vec());

        let lag = state.termination_lag;
        for id in ids {
            if let Some(instance) = state.instances.get_mut(id) {
                if !instance.state.is_terminal() {
                    info!(id = %id, "[MOCK] Terminating instance");
                    instance.state = InstanceState::ShuttingDown;
                    instance.remaining_lag = lag;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> LaunchSpec {
        LaunchSpec {
            image: "img-base".to_string(),
            instance_type: "m.large".to_string(),
            disk_gb: 64,
            key_name: "fleet-key".to_string(),
            subnet: None,
            security_group: None,
        }
    }

    #[tokio::test]
    async fn test_create_caps_limit_delivery() {
        let provider = MockProvider::new().with_create_caps([1]);

        let first = provider.create_instances(&spec(), 3).await.unwrap();
        assert_eq!(first.len(), 1);

        // Script exhausted: full delivery again.
        let second = provider.create_instances(&spec(), 3).await.unwrap();
        assert_eq!(second.len(), 3);

        assert_eq!(provider.create_requests(), vec![3, 3]);
    }

    #[tokio::test]
    async fn test_termination_lag() {
        let provider = MockProvider::new().with_termination_lag(1);
        let ids = provider.create_instances(&spec(), 1).await.unwrap();
        provider.terminate_instances(&ids).await.unwrap();

        // First poll still lists the instance as shutting-down.
        let listing = provider.list_instances("fleet-key").await.unwrap();
        assert_eq!(listing[0].state, InstanceState::ShuttingDown);

        // Second poll sees it terminated.
        let listing = provider.list_instances("fleet-key").await.unwrap();
        assert_eq!(listing[0].state, InstanceState::Terminated);
    }

    #[tokio::test]
    async fn test_persistent_tag_failure() {
        let provider = MockProvider::new().with_tag_failures([1]);
        let ids = provider.create_instances(&spec(), 2).await.unwrap();

        assert!(provider.tag_instance(&ids[0], "a").await.is_err());
        assert!(provider.tag_instance(&ids[0], "a").await.is_err());
        assert!(provider.tag_instance(&ids[1], "b").await.is_ok());
    }
}
