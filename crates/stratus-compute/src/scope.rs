//! Cluster and machine scopes handed to each reconcile pass.
//!
//! A scope bundles the resource's identity, its spec, and the status the pass
//! mutates. Persisting the status is the caller's job.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use k8s_openapi::api::core::v1::{NodeAddress, ObjectReference};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use stratus_common::{Error, Result};

use crate::model::{ApiEndpoint, InstanceState, SecurityGroup, SecurityGroupRole};

/// API version of the infrastructure resources events are attached to
pub const INFRASTRUCTURE_API_VERSION: &str = "infrastructure.cluster.x-k8s.io/v1beta1";

/// Label marking a machine as a control plane replica
pub const CONTROL_PLANE_LABEL: &str = "cluster.x-k8s.io/control-plane";

// =============================================================================
// Cluster
// =============================================================================

/// Placement of a cluster's resources
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Region of the account
    pub region: String,
    /// Availability zone for addresses and instances
    pub zone: String,
}

/// Security groups recorded for a cluster
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    /// Managed groups by role
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub security_groups: BTreeMap<SecurityGroupRole, SecurityGroup>,
}

/// Observed state of a cluster
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    /// Network and endpoint are in place
    #[serde(default)]
    pub ready: bool,
    /// Managed security groups
    #[serde(default)]
    pub network: NetworkStatus,
    /// Recorded API endpoints
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub api_endpoints: Vec<ApiEndpoint>,
}

/// A cluster under reconciliation
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClusterScope {
    /// Cluster name
    pub name: String,
    /// Namespace of the cluster resource
    pub namespace: String,
    /// Placement
    pub spec: ClusterSpec,
    /// Status mutated by the pass
    pub status: ClusterStatus,
}

impl ClusterScope {
    /// Create a scope with an empty status
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, spec: ClusterSpec) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            spec,
            status: ClusterStatus::default(),
        }
    }

    /// Recorded group for a role
    pub fn security_group(&self, role: SecurityGroupRole) -> Option<&SecurityGroup> {
        self.status.network.security_groups.get(&role)
    }

    /// First recorded API endpoint
    pub fn api_endpoint(&self) -> Option<&ApiEndpoint> {
        self.status.api_endpoints.first()
    }

    /// Reference for events on the cluster resource
    pub fn object_ref(&self) -> ObjectReference {
        ObjectReference {
            api_version: Some(INFRASTRUCTURE_API_VERSION.to_string()),
            kind: Some("StratusCluster".to_string()),
            name: Some(self.name.clone()),
            namespace: Some(self.namespace.clone()),
            ..Default::default()
        }
    }
}

// =============================================================================
// Machine
// =============================================================================

/// Role of a machine in the cluster
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum MachineRole {
    /// Control plane replica
    ControlPlane,
    /// Worker node
    Node,
}

impl MachineRole {
    /// Role derived from the machine's labels
    pub fn from_labels(labels: &BTreeMap<String, String>) -> Self {
        if labels.contains_key(CONTROL_PLANE_LABEL) {
            MachineRole::ControlPlane
        } else {
            MachineRole::Node
        }
    }

    /// Parse a role name, rejecting unknown roles
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "control-plane" => Ok(MachineRole::ControlPlane),
            "node" => Ok(MachineRole::Node),
            other => Err(Error::validation_for_field(
                "machine",
                "role",
                format!("unknown node role {:?}", other),
            )),
        }
    }

    /// Role spelling used in tags
    pub fn as_str(&self) -> &'static str {
        match self {
            MachineRole::ControlPlane => "control-plane",
            MachineRole::Node => "node",
        }
    }

    /// Security groups a machine of this role attaches
    pub fn security_group_roles(&self) -> &'static [SecurityGroupRole] {
        match self {
            MachineRole::ControlPlane | MachineRole::Node => &[SecurityGroupRole::ControlPlane],
        }
    }
}

impl fmt::Display for MachineRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Desired machine configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    /// `<provider>:////<uid>`, written once the instance is known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    /// Instance type
    pub instance_type: String,
    /// Explicit image; looked up by the default filter when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    /// SSH key name; the configured default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,
    /// Networks to attach, in device order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub network_interfaces: Vec<String>,
}

/// Progress of the one-shot bootstrap hand-off
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum BootstrapDelivery {
    /// Not delivered yet
    #[default]
    NotSent,
    /// A delivery was started but not confirmed
    Sending,
    /// Delivery confirmed
    Sent,
}

impl BootstrapDelivery {
    /// Whether a delivery should be attempted.
    ///
    /// `Sending` seen at the start of a pass means an earlier pass died
    /// mid-transfer, so the payload is sent again.
    pub fn needs_delivery(&self) -> bool {
        !matches!(self, BootstrapDelivery::Sent)
    }
}

/// Kind of terminal machine failure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum MachineFailureReason {
    /// The instance could not be brought to or kept in a usable state
    UpdateError,
}

/// Observed state of a machine
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MachineStatus {
    /// Instance is running
    #[serde(default)]
    pub ready: bool,
    /// Last observed instance state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub instance_state: Option<InstanceState>,
    /// Node addresses
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<NodeAddress>,
    /// Bootstrap hand-off progress
    #[serde(default)]
    pub bootstrap: BootstrapDelivery,
    /// Terminal failure reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<MachineFailureReason>,
    /// Terminal failure message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
}

impl MachineStatus {
    /// Whether a terminal failure was recorded
    pub fn has_failure(&self) -> bool {
        self.failure_reason.is_some() || self.failure_message.is_some()
    }

    /// Record a terminal failure
    pub fn set_failure(&mut self, reason: MachineFailureReason, message: impl Into<String>) {
        self.failure_reason = Some(reason);
        self.failure_message = Some(message.into());
    }
}

/// A machine under reconciliation
#[derive(Clone, Debug, PartialEq)]
pub struct MachineScope {
    /// Machine name
    pub name: String,
    /// Namespace of the machine resource
    pub namespace: String,
    /// Role in the cluster
    pub role: MachineRole,
    /// Desired configuration
    pub spec: MachineSpec,
    /// Bootstrap payload from the owning machine, once generated
    pub bootstrap_data: Option<String>,
    /// Whether the owning cluster's infrastructure is ready
    pub infrastructure_ready: bool,
    /// Status mutated by the pass
    pub status: MachineStatus,
}

impl MachineScope {
    /// Create a scope with an empty status
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        role: MachineRole,
        spec: MachineSpec,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            role,
            spec,
            bootstrap_data: None,
            infrastructure_ready: false,
            status: MachineStatus::default(),
        }
    }

    /// Whether this machine is a control plane replica
    pub fn is_control_plane(&self) -> bool {
        self.role == MachineRole::ControlPlane
    }

    /// Reference for events on the machine resource
    pub fn object_ref(&self) -> ObjectReference {
        ObjectReference {
            api_version: Some(INFRASTRUCTURE_API_VERSION.to_string()),
            kind: Some("StratusMachine".to_string()),
            name: Some(self.name.clone()),
            namespace: Some(self.namespace.clone()),
            ..Default::default()
        }
    }
}

// =============================================================================
// Provider ID
// =============================================================================

/// Parsed `<provider>:////<uid>` identifier
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderId {
    provider: String,
    uid: String,
}

impl ProviderId {
    /// Build a provider ID for an instance uid
    pub fn new(provider: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            uid: uid.into(),
        }
    }

    /// Parse a recorded provider ID.
    ///
    /// Absent or empty means the instance was never discovered.
    pub fn parse(value: Option<&str>) -> Result<Option<Self>> {
        let value = match value {
            None | Some("") => return Ok(None),
            Some(v) => v,
        };

        let invalid = |msg: &str| {
            Error::validation_for_field(
                "machine",
                "spec.providerId",
                format!("{} in provider ID {:?}", msg, value),
            )
        };

        let (provider, rest) = value
            .split_once("://")
            .ok_or_else(|| invalid("missing scheme separator"))?;
        if provider.is_empty() {
            return Err(invalid("empty provider"));
        }
        let uid = rest
            .rsplit('/')
            .next()
            .filter(|uid| !uid.is_empty())
            .ok_or_else(|| invalid("empty instance uid"))?;

        Ok(Some(Self::new(provider, uid)))
    }

    /// Provider scheme
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Instance uid
    pub fn uid(&self) -> &str {
        &self.uid
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:////{}", self.provider, self.uid)
    }
}

/// Names of the groups a machine must attach, or a failed dependency
pub fn machine_security_groups(cluster: &ClusterScope, role: MachineRole) -> Result<Vec<String>> {
    let mut seen = BTreeSet::new();
    let mut names = Vec::new();
    for sg_role in role.security_group_roles() {
        let group = cluster.security_group(*sg_role).ok_or_else(|| {
            Error::failed_dependency(
                format!("{} security group", sg_role),
                "security group not available",
            )
        })?;
        if seen.insert(group.name.clone()) {
            names.push(group.name.clone());
        }
    }
    Ok(names)
}
