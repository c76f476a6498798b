//! Deployment configuration.
//!
//! One immutable value object threaded into every component at
//! construction. Loaded from a TOML manifest by the CLI; nothing in the
//! core ever mutates it or reads configuration from the environment.

use std::collections::BTreeMap;
use std::time::Duration;

use flotilla_provider::LaunchSpec;
use serde::{Deserialize, Serialize};

use crate::node::Role;

/// Deployment parameters for one named fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    /// Cluster name; prefixes every node name.
    pub cluster_name: String,

    /// Access credential; tags every instance and filters the inventory.
    pub key_name: String,

    /// Machine image for all nodes.
    pub image: String,

    /// Location of the processing runtime archive.
    pub artifact_url: String,

    /// Remote directory the runtime is unpacked into.
    #[serde(default = "default_install_dir")]
    pub install_dir: String,

    /// Coordinator sizing.
    #[serde(default = "default_coordinator_sizing")]
    pub coordinator: RoleSizing,

    /// Worker sizing.
    #[serde(default = "default_worker_sizing")]
    pub worker: RoleSizing,

    /// Network placement.
    #[serde(default)]
    pub network: NetworkConfig,

    /// Extra environment entries written into every node's env file.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Credentials exported into remote commands that ask for injection.
    #[serde(default)]
    pub credentials: BTreeMap<String, String>,

    /// Address nodes by their public address instead of the private one.
    #[serde(default)]
    pub use_public_addr: bool,

    /// Retry attempt budgets and poll pacing.
    #[serde(default)]
    pub retries: RetryConfig,

    /// Concurrent per-node bootstrap units.
    #[serde(default = "default_bootstrap_concurrency")]
    pub bootstrap_concurrency: usize,

    /// Tear the whole fleet down when a bring-up operation fails.
    #[serde(default)]
    pub teardown_on_failure: bool,

    /// SSH transport settings.
    #[serde(default)]
    pub ssh: SshConfig,

    /// Provider endpoint settings.
    pub provider: ProviderConfig,
}

/// Per-role instance sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleSizing {
    pub instance_type: String,
    pub disk_gb: u32,
}

fn default_coordinator_sizing() -> RoleSizing {
    RoleSizing {
        instance_type: "m.large".to_string(),
        disk_gb: 64,
    }
}

fn default_worker_sizing() -> RoleSizing {
    RoleSizing {
        instance_type: "m.xlarge".to_string(),
        disk_gb: 256,
    }
}

fn default_install_dir() -> String {
    "/opt/flotilla".to_string()
}

fn default_bootstrap_concurrency() -> usize {
    8
}

/// Network placement settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Subnet for all nodes, provider default if unset.
    #[serde(default)]
    pub subnet: Option<String>,

    /// Security group for all nodes, provider default if unset.
    #[serde(default)]
    pub security_group: Option<String>,
}

/// Attempt budgets. Every remote wait is bounded; exhausting a budget is a
/// fatal error, never a silent abort.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Convergence rounds for a single `ensure_nodes` call.
    #[serde(default = "default_provision_attempts")]
    pub provision_attempts: u32,

    /// Attempts for a single provider mutation call (create, terminate)
    /// that fails transiently.
    #[serde(default = "default_request_attempts")]
    pub request_attempts: u32,

    /// Attempts for tagging one instance.
    #[serde(default = "default_tag_attempts")]
    pub tag_attempts: u32,

    /// Polls waiting for an instance to appear with an address.
    #[serde(default = "default_address_attempts")]
    pub address_attempts: u32,

    /// Polls waiting for terminated instances to leave the listing.
    #[serde(default = "default_terminate_attempts")]
    pub terminate_attempts: u32,

    /// Delay between polls and retries, in milliseconds.
    #[serde(default = "default_poll_delay_ms")]
    pub poll_delay_ms: u64,
}

fn default_provision_attempts() -> u32 {
    3
}

fn default_request_attempts() -> u32 {
    3
}

fn default_tag_attempts() -> u32 {
    5
}

fn default_address_attempts() -> u32 {
    30
}

fn default_terminate_attempts() -> u32 {
    30
}

fn default_poll_delay_ms() -> u64 {
    2000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            provision_attempts: default_provision_attempts(),
            request_attempts: default_request_attempts(),
            tag_attempts: default_tag_attempts(),
            address_attempts: default_address_attempts(),
            terminate_attempts: default_terminate_attempts(),
            poll_delay_ms: default_poll_delay_ms(),
        }
    }
}

impl RetryConfig {
    /// Delay between polls.
    pub fn poll_delay(&self) -> Duration {
        Duration::from_millis(self.poll_delay_ms)
    }
}

/// SSH transport settings as written in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    #[serde(default = "default_ssh_user")]
    pub user: String,

    #[serde(default = "default_ssh_port")]
    pub port: u16,

    /// Identity file; ssh-agent if unset.
    #[serde(default)]
    pub identity_file: Option<String>,
}

fn default_ssh_user() -> String {
    "ubuntu".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: default_ssh_user(),
            port: default_ssh_port(),
            identity_file: None,
        }
    }
}

/// Provider endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the provider API.
    pub endpoint: String,

    /// API token.
    pub api_token: String,
}

impl FleetConfig {
    /// Parse a TOML manifest.
    pub fn from_toml(manifest: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(manifest)
    }

    /// Launch parameters for one role.
    pub fn launch_spec(&self, role: Role) -> LaunchSpec {
        let sizing = match role {
            Role::Coordinator => &self.coordinator,
            Role::Worker => &self.worker,
        };
        LaunchSpec {
            image: self.image.clone(),
            instance_type: sizing.instance_type.clone(),
            disk_gb: sizing.disk_gb,
            key_name: self.key_name.clone(),
            subnet: self.network.subnet.clone(),
            security_group: self.network.security_group.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        cluster_name = "demo"
        key_name = "demo-key"
        image = "img-base"
        artifact_url = "https://artifacts.example.com/runtime-1.4.2.tgz"

        [provider]
        endpoint = "https://cloud.example.com"
        api_token = "secret"
    "#;

    #[test]
    fn test_minimal_manifest_gets_defaults() {
        let config = FleetConfig::from_toml(MINIMAL).unwrap();

        assert_eq!(config.cluster_name, "demo");
        assert_eq!(config.install_dir, "/opt/flotilla");
        assert_eq!(config.retries.provision_attempts, 3);
        assert_eq!(config.bootstrap_concurrency, 8);
        assert!(!config.teardown_on_failure);
        assert!(!config.use_public_addr);
        assert_eq!(config.ssh.user, "ubuntu");
        assert_eq!(config.worker.disk_gb, 256);
    }

    #[test]
    fn test_launch_spec_uses_role_sizing() {
        let config = FleetConfig::from_toml(MINIMAL).unwrap();

        let coordinator = config.launch_spec(Role::Coordinator);
        let worker = config.launch_spec(Role::Worker);

        assert_eq!(coordinator.instance_type, "m.large");
        assert_eq!(worker.instance_type, "m.xlarge");
        assert_eq!(worker.key_name, "demo-key");
    }

    #[test]
    fn test_overrides_parse() {
        let manifest = format!(
            "{}\n[env]\nRUNTIME_MEMORY = \"12g\"\n\n[retries]\npoll_delay_ms = 250\n",
            MINIMAL
        );
        let config = FleetConfig::from_toml(&manifest).unwrap();

        assert_eq!(config.env.get("RUNTIME_MEMORY").unwrap(), "12g");
        assert_eq!(config.retries.poll_delay(), Duration::from_millis(250));
        // Unset budgets keep their defaults.
        assert_eq!(config.retries.tag_attempts, 5);
    }
}
