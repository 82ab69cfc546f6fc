//! Resource model for security groups, endpoints and instances

use std::collections::BTreeSet;
use std::fmt;

use k8s_openapi::api::core::v1::NodeAddress;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use stratus_common::{Error, Result, Tag};

/// Port of the Kubernetes API server on the endpoint address
pub const API_ENDPOINT_PORT: u16 = 6443;

// =============================================================================
// Ingress rules
// =============================================================================

/// Protocol of an ingress rule
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Protocol {
    /// Every protocol; ports are ignored
    Any,
    /// TCP with a port range
    Tcp,
    /// UDP with a port range
    Udp,
    /// Any other provider protocol (ICMP, GRE, ...); ports are ignored
    Other(String),
}

impl Protocol {
    /// Provider spelling of the protocol
    pub fn as_str(&self) -> &str {
        match self {
            Protocol::Any => "ANY",
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Other(s) => s,
        }
    }

    /// Whether the port range is meaningful
    pub fn has_ports(&self) -> bool {
        matches!(self, Protocol::Tcp | Protocol::Udp)
    }
}

impl From<String> for Protocol {
    fn from(s: String) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "ANY" => Protocol::Any,
            "TCP" => Protocol::Tcp,
            "UDP" => Protocol::Udp,
            _ => Protocol::Other(s),
        }
    }
}

impl From<Protocol> for String {
    fn from(p: Protocol) -> Self {
        p.as_str().to_string()
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single firewall allow-rule
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngressRule {
    /// Rule protocol
    #[schemars(with = "String")]
    pub protocol: Protocol,
    /// First port of the range (TCP/UDP only)
    #[serde(default)]
    pub from_port: u16,
    /// Last port of the range (TCP/UDP only)
    #[serde(default)]
    pub to_port: u16,
    /// Free-form description; part of rule identity
    #[serde(default)]
    pub description: String,
    /// Permitted source CIDR blocks
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub cidr_blocks: BTreeSet<String>,
    /// Permitted source security groups, by name
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub source_security_groups: BTreeSet<String>,
}

impl IngressRule {
    /// A TCP rule for a single port from the given CIDR blocks
    pub fn tcp(description: &str, port: u16, cidr_blocks: &[&str]) -> Self {
        Self {
            protocol: Protocol::Tcp,
            from_port: port,
            to_port: port,
            description: description.to_string(),
            cidr_blocks: cidr_blocks.iter().map(|c| c.to_string()).collect(),
            source_security_groups: BTreeSet::new(),
        }
    }

    /// Remove the owning group from the rule's sources
    pub fn without_source_group(mut self, group_name: &str) -> Self {
        self.source_security_groups.remove(group_name);
        self
    }
}

/// Rule equality ignores source ordering, and ports unless TCP/UDP.
impl PartialEq for IngressRule {
    fn eq(&self, other: &Self) -> bool {
        if self.protocol != other.protocol
            || self.description != other.description
            || self.cidr_blocks != other.cidr_blocks
            || self.source_security_groups != other.source_security_groups
        {
            return false;
        }
        if self.protocol.has_ports() {
            return self.from_port == other.from_port && self.to_port == other.to_port;
        }
        true
    }
}

impl Eq for IngressRule {}

impl fmt::Display for IngressRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.protocol)?;
        if self.protocol.has_ports() {
            write!(f, " {}-{}", self.from_port, self.to_port)?;
        }
        if !self.description.is_empty() {
            write!(f, " ({})", self.description)?;
        }
        Ok(())
    }
}

/// An unordered collection of ingress rules
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct IngressRules(pub Vec<IngressRule>);

impl IngressRules {
    /// Rules of `self` with no equal rule in `other`
    pub fn difference(&self, other: &IngressRules) -> IngressRules {
        IngressRules(
            self.0
                .iter()
                .filter(|rule| !other.contains(rule))
                .cloned()
                .collect(),
        )
    }

    /// Whether an equal rule is present
    pub fn contains(&self, rule: &IngressRule) -> bool {
        self.0.iter().any(|r| r == rule)
    }

    /// Drop the owning group from every rule's sources
    pub fn without_source_group(self, group_name: &str) -> IngressRules {
        IngressRules(
            self.0
                .into_iter()
                .map(|r| r.without_source_group(group_name))
                .collect(),
        )
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no rules
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the rules
    pub fn iter(&self) -> std::slice::Iter<'_, IngressRule> {
        self.0.iter()
    }
}

/// Set equality: same rules regardless of order.
impl PartialEq for IngressRules {
    fn eq(&self, other: &Self) -> bool {
        self.difference(other).is_empty() && other.difference(self).is_empty()
    }
}

impl FromIterator<IngressRule> for IngressRules {
    fn from_iter<I: IntoIterator<Item = IngressRule>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for IngressRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|r| r.to_string()).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

// =============================================================================
// Security groups
// =============================================================================

/// Role a security group serves in the cluster
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum SecurityGroupRole {
    /// Bastion hosts
    Bastion,
    /// Control plane replicas
    #[serde(rename = "controlplane")]
    ControlPlane,
    /// Worker nodes
    Node,
}

impl SecurityGroupRole {
    /// Roles the engine creates groups for
    pub const MANAGED: [SecurityGroupRole; 1] = [SecurityGroupRole::ControlPlane];

    /// Role spelling used in names and descriptions
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityGroupRole::Bastion => "bastion",
            SecurityGroupRole::ControlPlane => "controlplane",
            SecurityGroupRole::Node => "node",
        }
    }
}

impl fmt::Display for SecurityGroupRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owner record stored as a group's description
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroupOwner {
    /// Owning cluster
    pub cluster: String,
    /// Role the group serves
    pub role: String,
}

impl SecurityGroupOwner {
    /// JSON form, e.g. `{"cluster":"prod","role":"controlplane"}`
    pub fn to_description(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            Error::internal_with_context("security group description", e.to_string())
        })
    }
}

/// A security group as observed or created
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroup {
    /// Provider identifier
    pub id: String,
    /// Deterministic group name
    pub name: String,
    /// Rules currently attached
    #[serde(default)]
    pub ingress_rules: IngressRules,
}

// =============================================================================
// Endpoints and instances
// =============================================================================

/// Address and port of the cluster API server
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ApiEndpoint {
    /// Floating public address
    pub host: String,
    /// API server port
    pub port: u16,
}

/// Provider lifecycle state of an instance
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InstanceState {
    /// Booting or shutting down
    Pending,
    /// Up
    Running,
    /// Halted but not terminated
    Stopped,
    /// Waiting on the provider
    Waiting,
    /// Any state the engine does not model
    Other(String),
}

impl InstanceState {
    /// Provider spelling of the state
    pub fn as_str(&self) -> &str {
        match self {
            InstanceState::Pending => "pending",
            InstanceState::Running => "running",
            InstanceState::Stopped => "stopped",
            InstanceState::Waiting => "waiting",
            InstanceState::Other(s) => s,
        }
    }
}

impl From<String> for InstanceState {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending" => InstanceState::Pending,
            "running" => InstanceState::Running,
            "stopped" => InstanceState::Stopped,
            "waiting" => InstanceState::Waiting,
            _ => InstanceState::Other(s),
        }
    }
}

impl From<&str> for InstanceState {
    fn from(s: &str) -> Self {
        InstanceState::from(s.to_string())
    }
}

impl From<InstanceState> for String {
    fn from(s: InstanceState) -> Self {
        s.as_str().to_string()
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compute instance backing one machine
#[derive(Clone, Debug, PartialEq)]
pub struct Instance {
    /// Provider-assigned identity, known only after creation
    pub uid: String,
    /// Deterministic id derived from the machine name
    pub id: String,
    /// Availability zone
    pub zone: String,
    /// Lifecycle state
    pub state: InstanceState,
    /// Instance type
    pub instance_type: String,
    /// Image the instance was created from
    pub image_id: String,
    /// Encoded user data, if reported
    pub user_data: Option<String>,
    /// Attached security group names
    pub security_groups: Vec<String>,
    /// SSH key name, if reported
    pub ssh_key_name: Option<String>,
    /// Tags decoded from the description
    pub tags: Tag,
    /// Public address, if any
    pub public_ip: Option<String>,
    /// Private address, if any
    pub private_ip: Option<String>,
    /// Node addresses for the machine status
    pub addresses: Vec<NodeAddress>,
    /// Attached network interface ids
    pub network_interface_ids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(desc: &str, port: u16, cidrs: &[&str]) -> IngressRule {
        IngressRule::tcp(desc, port, cidrs)
    }

    // ==========================================================================
    // Rule equality
    // ==========================================================================

    #[test]
    fn test_cidr_order_does_not_matter() {
        let a = rule("SSH", 22, &["10.0.0.1", "10.0.0.2"]);
        let b = rule("SSH", 22, &["10.0.0.2", "10.0.0.1"]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_ports_matter_for_tcp() {
        assert_ne!(rule("SSH", 22, &["10.0.0.1"]), rule("SSH", 2222, &["10.0.0.1"]));
    }

    #[test]
    fn test_any_protocol_ignores_ports() {
        let mut a = rule("all", 0, &["10.0.0.0/8"]);
        a.protocol = Protocol::Any;
        let mut b = a.clone();
        b.from_port = 1;
        b.to_port = 65535;
        assert_eq!(a, b);
    }

    #[test]
    fn test_description_and_sources_matter() {
        let base = rule("SSH", 22, &["10.0.0.1"]);
        assert_ne!(base, rule("ssh", 22, &["10.0.0.1"]));

        let mut peered = base.clone();
        peered.source_security_groups.insert("other".to_string());
        assert_ne!(base, peered);
    }

    // ==========================================================================
    // Difference
    // ==========================================================================

    /// Story: The differ finds exactly what to revoke and what to authorize
    #[test]
    fn story_difference_drives_revoke_and_authorize() {
        let ssh = rule("SSH", 22, &["203.0.113.7"]);
        let api = rule("Kubernetes API", 6443, &["203.0.113.7"]);
        let stale = rule("SSH", 22, &["198.51.100.1"]);

        let current: IngressRules = [stale.clone(), ssh.clone()].into_iter().collect();
        let desired: IngressRules = [api.clone(), ssh.clone()].into_iter().collect();

        let to_revoke = current.difference(&desired);
        let to_authorize = desired.difference(&current);

        assert_eq!(to_revoke.0, vec![stale]);
        assert_eq!(to_authorize.0, vec![api]);
    }

    #[test]
    fn test_difference_of_converged_sets_is_empty() {
        let ssh = rule("SSH", 22, &["203.0.113.7"]);
        let api = rule("Kubernetes API", 6443, &["203.0.113.7"]);
        let a: IngressRules = [ssh.clone(), api.clone()].into_iter().collect();
        let b: IngressRules = [api, ssh].into_iter().collect();

        assert!(a.difference(&b).is_empty());
        assert!(b.difference(&a).is_empty());
        assert_eq!(a, b);
    }

    #[test]
    fn test_difference_result_never_contains_rules_of_other() {
        let rules: Vec<IngressRule> = (0..6)
            .map(|i| rule("r", 1000 + (i % 3) as u16, &["10.0.0.1"]))
            .collect();
        let a: IngressRules = rules[..4].iter().cloned().collect();
        let b: IngressRules = rules[2..].iter().cloned().collect();

        let diff = a.difference(&b);
        assert!(diff.iter().all(|r| !b.contains(r)));
        // Everything in `a` not matched by `b` survives
        assert!(a.iter().filter(|r| !b.contains(r)).all(|r| diff.contains(r)));
    }

    #[test]
    fn test_self_reference_removed() {
        let mut r = rule("cluster", 0, &[]);
        r.protocol = Protocol::Any;
        r.source_security_groups = ["self".to_string(), "peer".to_string()].into();

        let sanitized = IngressRules(vec![r]).without_source_group("self");
        let sources: Vec<&String> = sanitized.0[0].source_security_groups.iter().collect();
        assert_eq!(sources, vec!["peer"]);
    }

    // ==========================================================================
    // Enums and serialization
    // ==========================================================================

    #[test]
    fn test_instance_state_round_trip() {
        for s in ["pending", "running", "stopped", "waiting"] {
            assert_eq!(InstanceState::from(s).as_str(), s);
        }
        assert_eq!(
            InstanceState::from("terminated"),
            InstanceState::Other("terminated".to_string())
        );
    }

    #[test]
    fn test_protocol_parsing() {
        assert_eq!(Protocol::from("tcp".to_string()), Protocol::Tcp);
        assert_eq!(Protocol::from("ANY".to_string()), Protocol::Any);
        assert_eq!(
            Protocol::from("ICMP".to_string()),
            Protocol::Other("ICMP".to_string())
        );
    }

    #[test]
    fn test_owner_description_json() {
        let owner = SecurityGroupOwner {
            cluster: "prod".to_string(),
            role: SecurityGroupRole::ControlPlane.to_string(),
        };
        assert_eq!(
            owner.to_description().unwrap(),
            r#"{"cluster":"prod","role":"controlplane"}"#
        );
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&SecurityGroupRole::ControlPlane).unwrap();
        assert_eq!(json, "\"controlplane\"");
    }
}
