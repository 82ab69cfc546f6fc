//! Instance lifecycle: lookup, creation, and stop-then-terminate teardown

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tracing::{debug, info, warn};

use stratus_common::codes;
use stratus_common::events::{actions, reasons};
use stratus_common::{Error, Result, ResultExt, Tag};

use crate::client::{InstanceRecord, NetworkInterfaceRequest, RunInstanceRequest};
use crate::convert;
use crate::model::Instance;
use crate::names;
use crate::scope::{machine_security_groups, ClusterScope, MachineScope};
use crate::service::ComputingService;
use crate::userdata;

/// Instance operations for a machine
#[cfg_attr(test, automock)]
#[async_trait]
pub trait InstanceService: Send + Sync {
    /// The instance with this id, or `None` if the provider does not know it
    async fn instance_if_exists(&self, instance_id: &str) -> Result<Option<Instance>>;

    /// Create the machine's instance and wait until it runs
    async fn create_instance(&self, cluster: &ClusterScope, machine: &MachineScope)
        -> Result<Instance>;

    /// The machine's instance found through its cluster and role tags
    async fn get_running_instance_by_tag(
        &self,
        cluster: &ClusterScope,
        machine: &MachineScope,
    ) -> Result<Option<Instance>>;

    /// Stop, wait, terminate, wait
    async fn stop_and_terminate_instance_with_timeout(&self, instance_id: &str) -> Result<()>;

    /// Terminate an already stopped instance
    async fn terminate_instance(&self, instance_id: &str) -> Result<()>;
}

#[async_trait]
impl InstanceService for ComputingService {
    async fn instance_if_exists(&self, instance_id: &str) -> Result<Option<Instance>> {
        debug!(instance_id = %instance_id, "Looking up instance");

        let Some(records) = self.describe_instances_tolerating_not_found(&[instance_id.to_string()]).await? else {
            return Ok(None);
        };
        records
            .iter()
            .find(|r| r.instance_id.as_deref() == Some(instance_id))
            .map(convert::decode_instance)
            .transpose()
    }

    async fn create_instance(
        &self,
        cluster: &ClusterScope,
        machine: &MachineScope,
    ) -> Result<Instance> {
        let instance_id = names::instance_id(&machine.name);
        info!(
            machine = %machine.name,
            instance_id = %instance_id,
            role = %machine.role,
            "Creating instance"
        );

        match self.run_and_wait(cluster, machine, &instance_id).await {
            Ok(instance) => {
                info!(machine = %machine.name, instance_id = %instance.id, uid = %instance.uid, "Instance running");
                self.publish_normal(
                    &machine.object_ref(),
                    reasons::INSTANCE_CREATED,
                    actions::CREATE,
                    format!("Created instance {}", instance.id),
                )
                .await;
                Ok(instance)
            }
            Err(e) => {
                warn!(machine = %machine.name, instance_id = %instance_id, error = %e, "Failed to create instance");
                self.publish_warning(
                    &machine.object_ref(),
                    reasons::INSTANCE_CREATE_FAILED,
                    actions::CREATE,
                    format!("Failed to create instance {}: {}", instance_id, e),
                )
                .await;
                Err(e)
            }
        }
    }

    async fn get_running_instance_by_tag(
        &self,
        cluster: &ClusterScope,
        machine: &MachineScope,
    ) -> Result<Option<Instance>> {
        let wanted = Tag::build(&cluster.name, Some(machine.role.as_str()), None);
        let instance_id = names::instance_id(&machine.name);
        debug!(machine = %machine.name, tags = ?wanted, "Looking up instance by tags");

        let Some(records) = self.describe_instances_tolerating_not_found(&[]).await? else {
            return Ok(None);
        };
        records
            .iter()
            .filter(|r| Tag::parse(r.description.as_deref().unwrap_or_default()).contains_all(&wanted))
            .find(|r| r.instance_id.as_deref() == Some(instance_id.as_str()))
            .map(convert::decode_instance)
            .transpose()
    }

    async fn stop_and_terminate_instance_with_timeout(&self, instance_id: &str) -> Result<()> {
        info!(instance_id = %instance_id, "Stopping instance");
        self.client
            .stop_instance(instance_id)
            .await
            .with_context(|| format!("failed to stop instance {}", instance_id))?;
        self.client
            .wait_until_instance_stopped(instance_id, &self.config.backoff)
            .await
            .with_context(|| format!("failed waiting for instance {} to stop", instance_id))?;

        self.terminate_instance(instance_id).await?;
        self.client
            .wait_until_instance_deleted(instance_id, &self.config.backoff)
            .await
            .with_context(|| format!("failed waiting for instance {} to terminate", instance_id))
    }

    async fn terminate_instance(&self, instance_id: &str) -> Result<()> {
        info!(instance_id = %instance_id, "Terminating instance");
        self.client
            .terminate_instance(instance_id)
            .await
            .with_context(|| format!("failed to terminate instance {}", instance_id))
    }
}

impl ComputingService {
    /// Describe instances; `None` when the provider reports them unknown
    async fn describe_instances_tolerating_not_found(
        &self,
        instance_ids: &[String],
    ) -> Result<Option<Vec<InstanceRecord>>> {
        match self.client.describe_instances(instance_ids).await {
            Ok(records) => Ok(Some(records)),
            Err(e) if codes::is_not_found(&e) => {
                debug!(instance_ids = ?instance_ids, "Provider reports instance not found");
                Ok(None)
            }
            Err(e) => Err(e.context("failed to describe instances")),
        }
    }

    async fn run_and_wait(
        &self,
        cluster: &ClusterScope,
        machine: &MachineScope,
        instance_id: &str,
    ) -> Result<Instance> {
        let endpoint = if machine.is_control_plane() {
            let endpoint = cluster.api_endpoint().cloned().ok_or_else(|| {
                Error::failed_dependency(
                    "api endpoint",
                    format!("cluster {} has no endpoint address recorded", cluster.name),
                )
            })?;
            Some(endpoint)
        } else {
            None
        };

        let security_groups = machine_security_groups(cluster, machine.role)?;
        let image_id = match machine.spec.image_id.as_deref() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => self.default_image_id().await?,
        };
        let key_name = machine
            .spec
            .key_name
            .clone()
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| self.config.default_ssh_key_name.clone());
        let user_data = userdata::encoded(instance_id, &self.config.bootstrap.destination)?;
        let description = Tag::build(&cluster.name, Some(machine.role.as_str()), None).encode()?;

        let network_interfaces: Vec<NetworkInterfaceRequest> = machine
            .spec
            .network_interfaces
            .iter()
            .enumerate()
            .map(|(index, network_id)| NetworkInterfaceRequest {
                device_index: index as u32,
                network_id: network_id.clone(),
            })
            .collect();
        // Groups ride on the interfaces when those are given explicitly
        let security_groups = if network_interfaces.is_empty() {
            security_groups
        } else {
            Vec::new()
        };

        let request = RunInstanceRequest {
            instance_id: instance_id.to_string(),
            instance_type: machine.spec.instance_type.clone(),
            image_id,
            key_name,
            security_groups,
            network_interfaces,
            user_data: Some(user_data),
            description,
            disable_api_termination: false,
        };
        debug!(instance_id = %instance_id, image_id = %request.image_id, "Submitting instance");

        self.client
            .run_instance(&request)
            .await
            .with_context(|| format!("failed to run instance {}", instance_id))?;
        self.wait_running(instance_id).await?;
        let mut instance = self.describe_created(instance_id).await?;

        if let Some(endpoint) = endpoint {
            info!(instance_id = %instance_id, address = %endpoint.host, "Associating endpoint address");
            self.client
                .associate_address(instance_id, &endpoint.host)
                .await
                .with_context(|| {
                    format!("failed to associate {} with instance {}", endpoint.host, instance_id)
                })?;
            self.wait_running(instance_id).await?;
            instance = self.describe_created(instance_id).await?;
        }

        Ok(instance)
    }

    async fn wait_running(&self, instance_id: &str) -> Result<()> {
        self.client
            .wait_until_instance_running(instance_id, &self.config.backoff)
            .await
            .with_context(|| format!("failed waiting for instance {} to run", instance_id))
    }

    async fn describe_created(&self, instance_id: &str) -> Result<Instance> {
        self.instance_if_exists(instance_id)
            .await?
            .ok_or_else(|| Error::not_found("instance", instance_id))
    }

    /// First image matching the configured default selector
    async fn default_image_id(&self) -> Result<String> {
        let selector = &self.config.default_image;
        let images = self
            .client
            .describe_images(&selector.name, &selector.owner)
            .await
            .with_context(|| format!("failed to look up image {:?}", selector.name))?;

        let image = images.first().ok_or_else(|| {
            Error::not_found(
                "image",
                format!("name={:?} owner={:?}", selector.name, selector.owner),
            )
        })?;
        let image_id = image
            .image_id
            .clone()
            .ok_or_else(|| Error::decode("image", "imageId"))?;

        debug!(image_id = %image_id, "Using default image");
        Ok(image_id)
    }
}
