//! Cloud computing API seam
//!
//! The transport (HTTP signing, SDK calls) lives outside this crate and is
//! consumed through [`ComputingClient`]. Records mirror the provider's
//! responses, so every field the provider may omit is an `Option`; the
//! [`crate::convert`] module turns them into model types.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use stratus_common::codes;
use stratus_common::retry::{wait_for, Backoff};
use stratus_common::Result;

use crate::model::InstanceState;

/// Instance as reported by the provider
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InstanceRecord {
    /// Deterministic instance id
    pub instance_id: Option<String>,
    /// Provider-assigned unique id
    pub instance_unique_id: Option<String>,
    /// Lifecycle state name
    pub instance_state: Option<String>,
    /// Instance type
    pub instance_type: Option<String>,
    /// Image id
    pub image_id: Option<String>,
    /// Placement availability zone
    pub availability_zone: Option<String>,
    /// SSH key name
    pub key_name: Option<String>,
    /// Free-form description carrying encoded tags
    pub description: Option<String>,
    /// Encoded user data
    pub user_data: Option<String>,
    /// Public address
    pub ip_address: Option<String>,
    /// Private address
    pub private_ip_address: Option<String>,
    /// Attached security group names
    pub security_groups: Vec<String>,
    /// Attached network interfaces
    pub network_interfaces: Vec<NetworkInterfaceRecord>,
}

/// Network interface of an instance
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NetworkInterfaceRecord {
    /// Interface id
    pub network_interface_id: Option<String>,
    /// Private address on this interface
    pub private_ip_address: Option<String>,
    /// Private DNS name on this interface
    pub private_dns_name: Option<String>,
    /// Public association, if any
    pub association: Option<AssociationRecord>,
}

/// Public address associated with an interface
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AssociationRecord {
    /// Public address
    pub public_ip: Option<String>,
    /// Public DNS name
    pub public_dns_name: Option<String>,
}

/// Machine image
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImageRecord {
    /// Image id
    pub image_id: Option<String>,
    /// Image name
    pub name: Option<String>,
}

/// Floating address
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AddressRecord {
    /// The address itself
    pub public_ip: Option<String>,
    /// Instance the address is associated with
    pub instance_id: Option<String>,
    /// Free-form description carrying encoded tags
    pub description: Option<String>,
}

/// Security group with its ingress permissions
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SecurityGroupRecord {
    /// Group name
    pub group_name: Option<String>,
    /// Group description
    pub description: Option<String>,
    /// Attached ingress permissions
    pub ip_permissions: Vec<IpPermissionRecord>,
}

/// Ingress permission in provider form, used for both requests and responses
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IpPermissionRecord {
    /// Protocol name
    pub ip_protocol: Option<String>,
    /// First port
    pub from_port: Option<i32>,
    /// Last port
    pub to_port: Option<i32>,
    /// Description
    pub description: Option<String>,
    /// Source CIDR blocks
    pub ip_ranges: Vec<String>,
    /// Source security group names
    pub groups: Vec<String>,
}

/// Network interface entry of a create request
#[derive(Clone, Debug, PartialEq)]
pub struct NetworkInterfaceRequest {
    /// Position of the interface on the instance
    pub device_index: u32,
    /// Network to attach
    pub network_id: String,
}

/// Instance create request
#[derive(Clone, Debug, PartialEq)]
pub struct RunInstanceRequest {
    /// Deterministic instance id
    pub instance_id: String,
    /// Instance type
    pub instance_type: String,
    /// Image id
    pub image_id: String,
    /// SSH key name
    pub key_name: String,
    /// Security groups; empty when network interfaces are given
    pub security_groups: Vec<String>,
    /// Explicit network interfaces
    pub network_interfaces: Vec<NetworkInterfaceRequest>,
    /// Base64 user data
    pub user_data: Option<String>,
    /// Encoded tags
    pub description: String,
    /// Whether API termination is disabled
    pub disable_api_termination: bool,
}

/// Cloud computing API consumed by the engine
///
/// Every error carries the provider's error code via [`stratus_common::Error::Api`].
/// The three waiters have polling defaults built on `describe_instances`;
/// transports with native waiters may override them.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ComputingClient: Send + Sync {
    /// Describe instances by id, or all instances when `instance_ids` is empty
    async fn describe_instances(&self, instance_ids: &[String]) -> Result<Vec<InstanceRecord>>;

    /// Submit an instance create request
    async fn run_instance(&self, request: &RunInstanceRequest) -> Result<()>;

    /// Stop an instance
    async fn stop_instance(&self, instance_id: &str) -> Result<()>;

    /// Terminate an instance
    async fn terminate_instance(&self, instance_id: &str) -> Result<()>;

    /// Describe images matching a name and owner
    async fn describe_images(&self, name: &str, owner: &str) -> Result<Vec<ImageRecord>>;

    /// Describe all floating addresses of the account
    async fn describe_addresses(&self) -> Result<Vec<AddressRecord>>;

    /// Allocate a floating address, returning it
    async fn allocate_address(&self, zone: &str, region: &str, description: &str)
        -> Result<String>;

    /// Release a floating address
    async fn release_address(&self, public_ip: &str) -> Result<()>;

    /// Associate a floating address with an instance
    async fn associate_address(&self, instance_id: &str, public_ip: &str) -> Result<()>;

    /// Describe security groups whose name starts with `name_prefix`
    async fn describe_security_groups(&self, name_prefix: &str)
        -> Result<Vec<SecurityGroupRecord>>;

    /// Create an empty security group
    async fn create_security_group(&self, name: &str, description: &str) -> Result<()>;

    /// Delete a security group
    async fn delete_security_group(&self, name: &str) -> Result<()>;

    /// Add ingress permissions to a group
    async fn authorize_security_group_ingress(
        &self,
        group_name: &str,
        permissions: &[IpPermissionRecord],
    ) -> Result<()>;

    /// Remove ingress permissions from a group
    async fn revoke_security_group_ingress(
        &self,
        group_name: &str,
        permissions: &[IpPermissionRecord],
    ) -> Result<()>;

    /// Block until the instance reports `running`
    async fn wait_until_instance_running(&self, instance_id: &str, backoff: &Backoff) -> Result<()> {
        wait_for_state(self, instance_id, InstanceState::Running, backoff).await
    }

    /// Block until the instance reports `stopped`
    async fn wait_until_instance_stopped(&self, instance_id: &str, backoff: &Backoff) -> Result<()> {
        wait_for_state(self, instance_id, InstanceState::Stopped, backoff).await
    }

    /// Block until the instance no longer exists
    async fn wait_until_instance_deleted(&self, instance_id: &str, backoff: &Backoff) -> Result<()> {
        let ids = [instance_id.to_string()];
        let ids = &ids[..];
        let client = self;
        wait_for(backoff, "instance deleted", move || async move {
            match client.describe_instances(ids).await {
                Ok(records) => Ok(records
                    .iter()
                    .all(|r| r.instance_id.as_deref() != Some(ids[0].as_str()))),
                Err(e) if codes::is_not_found(&e) => Ok(true),
                Err(e) => Err(e),
            }
        })
        .await
    }
}

async fn wait_for_state<C: ComputingClient + ?Sized>(
    client: &C,
    instance_id: &str,
    target: InstanceState,
    backoff: &Backoff,
) -> Result<()> {
    let ids = [instance_id.to_string()];
    let ids = &ids[..];
    let target = &target;
    let operation = format!("instance {} {}", instance_id, target);
    wait_for(backoff, &operation, move || async move {
        let records = client.describe_instances(ids).await?;
        Ok(records.iter().any(|r| {
            r.instance_id.as_deref() == Some(ids[0].as_str())
                && r.instance_state.as_deref() == Some(target.as_str())
        }))
    })
    .await
}
