//! Instance types shared by all provider implementations.

use serde::{Deserialize, Serialize};

/// Opaque provider-issued instance identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    /// Wrap a raw provider id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for InstanceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for InstanceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Provider-side lifecycle state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceState {
    Pending,
    Running,
    ShuttingDown,
    Stopped,
    Terminated,
}

impl InstanceState {
    /// Whether the instance is gone for good.
    ///
    /// `shutting-down` is deliberately not terminal: instances on the way
    /// out stay visible so termination can be confirmed rather than assumed,
    /// and their names stay reserved until the provider reports them gone.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::ShuttingDown => "shutting-down",
            Self::Stopped => "stopped",
            Self::Terminated => "terminated",
        };
        write!(f, "{}", s)
    }
}

/// One instance as reported by the provider inventory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceDescriptor {
    /// Provider id.
    pub id: InstanceId,

    /// Assigned name label, if any. Freshly created instances are unnamed
    /// until tagged.
    #[serde(default)]
    pub name: Option<String>,

    /// Access credential the instance was launched with.
    pub key_name: String,

    /// Current lifecycle state.
    pub state: InstanceState,

    /// Private network address, once assigned.
    #[serde(default)]
    pub private_addr: Option<String>,

    /// Public network address, once assigned.
    #[serde(default)]
    pub public_addr: Option<String>,
}

impl InstanceDescriptor {
    /// The address to use for the given visibility, if already assigned
    /// and non-empty.
    pub fn addr(&self, public: bool) -> Option<&str> {
        let addr = if public {
            self.public_addr.as_deref()
        } else {
            self.private_addr.as_deref()
        };
        addr.filter(|a| !a.is_empty())
    }
}

/// Parameters for a batch instance creation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchSpec {
    /// Machine image to boot.
    pub image: String,

    /// Instance class (sizing).
    pub instance_type: String,

    /// Root disk size in GiB.
    pub disk_gb: u32,

    /// Access credential; doubles as the fleet membership filter.
    pub key_name: String,

    /// Subnet to place the instances in, provider default if unset.
    #[serde(default)]
    pub subnet: Option<String>,

    /// Security group to attach, provider default if unset.
    #[serde(default)]
    pub security_group: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_terminality() {
        assert!(InstanceState::Terminated.is_terminal());
        assert!(!InstanceState::ShuttingDown.is_terminal());
        assert!(!InstanceState::Running.is_terminal());
        assert!(!InstanceState::Pending.is_terminal());
    }

    #[test]
    fn test_addr_visibility() {
        let desc = InstanceDescriptor {
            id: InstanceId::new("i-1"),
            name: None,
            key_name: "fleet-key".to_string(),
            state: InstanceState::Running,
            private_addr: Some("10.0.0.5".to_string()),
            public_addr: Some("".to_string()),
        };

        assert_eq!(desc.addr(false), Some("10.0.0.5"));
        // Empty addresses count as unassigned.
        assert_eq!(desc.addr(true), None);
    }

    #[test]
    fn test_state_serde_kebab_case() {
        let state: InstanceState = serde_json::from_str("\"shutting-down\"").unwrap();
        assert_eq!(state, InstanceState::ShuttingDown);
        assert_eq!(serde_json::to_string(&state).unwrap(), "\"shutting-down\"");
    }
}
