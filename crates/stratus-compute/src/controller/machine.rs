//! Machine reconcile: adopt or create the instance, track its state, and
//! hand the bootstrap payload over once it runs.

use kube::runtime::events::EventType;
use tracing::{debug, info, instrument, warn};

use stratus_common::events::{actions, reasons};
use stratus_common::{Error, Result, ResultExt};

use super::Context;
use crate::model::{Instance, InstanceState};
use crate::names;
use crate::scope::{BootstrapDelivery, ClusterScope, MachineFailureReason, MachineScope, ProviderId};
use crate::transfer::TransferRequest;

/// Result of one deletion pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The instance was terminated
    Terminated,
    /// The instance is still starting; try again later
    Deferred,
    /// No instance exists for the machine
    NotFound,
}

/// Converge a machine onto a running, bootstrapped instance
#[instrument(skip(cluster, machine, ctx), fields(machine = %machine.name, role = %machine.role))]
pub async fn reconcile_machine(
    cluster: &ClusterScope,
    machine: &mut MachineScope,
    ctx: &Context,
) -> Result<()> {
    info!("reconciling machine");

    if machine.status.has_failure() {
        info!("machine has a recorded failure, skipping");
        return Ok(());
    }
    if !machine.infrastructure_ready {
        info!("cluster infrastructure is not ready yet");
        return Ok(());
    }
    let Some(bootstrap_data) = machine.bootstrap_data.clone() else {
        info!("bootstrap data is not available yet");
        return Ok(());
    };

    let instance = match find_instance(cluster, machine, ctx).await? {
        Some(instance) => {
            debug!(instance_id = %instance.id, "found existing instance");
            instance
        }
        None => ctx
            .instances
            .create_instance(cluster, machine)
            .await
            .context("failed to create instance")?,
    };

    machine.spec.provider_id =
        Some(ProviderId::new(&ctx.config.provider_name, &instance.uid).to_string());

    let previous = machine.status.instance_state.replace(instance.state.clone());
    if previous.as_ref() != Some(&instance.state) {
        info!(instance_id = %instance.id, state = %instance.state, "instance state changed");
    }

    match &instance.state {
        InstanceState::Pending | InstanceState::Stopped => {
            machine.status.bootstrap = BootstrapDelivery::NotSent;
        }
        InstanceState::Running => {
            machine.status.ready = true;
        }
        other => {
            warn!(instance_id = %instance.id, state = %other, "instance state is undefined");
            machine.status.ready = false;
            machine.status.bootstrap = BootstrapDelivery::NotSent;
            machine.status.set_failure(
                MachineFailureReason::UpdateError,
                format!("instance state {:?} is undefined", other.as_str()),
            );
        }
    }
    if instance.state == InstanceState::Stopped {
        warn!(instance_id = %instance.id, "instance stopped unexpectedly");
        machine.status.set_failure(
            MachineFailureReason::UpdateError,
            "instance state \"stopped\" is unexpected",
        );
    }

    machine.status.addresses = instance.addresses.clone();

    if instance.state == InstanceState::Running
        && machine.status.ready
        && machine.status.bootstrap.needs_delivery()
    {
        deliver_bootstrap(cluster, machine, &instance, bootstrap_data, ctx).await?;
    }

    Ok(())
}

/// Take a machine's instance down.
///
/// A stopped instance is terminated directly; a pending one is left for a
/// later pass; anything else is stopped first.
#[instrument(skip(cluster, machine, ctx), fields(machine = %machine.name))]
pub async fn reconcile_machine_delete(
    cluster: &ClusterScope,
    machine: &mut MachineScope,
    ctx: &Context,
) -> Result<DeleteOutcome> {
    info!("deleting machine");

    let Some(instance) = find_instance(cluster, machine, ctx).await? else {
        warn!("no instance found for machine");
        ctx.events
            .publish(
                &machine.object_ref(),
                EventType::Warning,
                reasons::INSTANCE_NOT_FOUND,
                actions::DELETE,
                Some(format!("Unable to find instance for machine {}", machine.name)),
            )
            .await;
        return Ok(DeleteOutcome::NotFound);
    };

    let result = match instance.state {
        InstanceState::Stopped => ctx.instances.terminate_instance(&instance.id).await,
        InstanceState::Pending => {
            info!(instance_id = %instance.id, "instance is still starting, deferring deletion");
            return Ok(DeleteOutcome::Deferred);
        }
        _ => {
            ctx.instances
                .stop_and_terminate_instance_with_timeout(&instance.id)
                .await
        }
    };

    match result {
        Ok(()) => {
            info!(instance_id = %instance.id, "instance terminated");
            ctx.events
                .publish(
                    &machine.object_ref(),
                    EventType::Normal,
                    reasons::INSTANCE_TERMINATED,
                    actions::DELETE,
                    Some(format!("Terminated instance {}", instance.id)),
                )
                .await;
            machine.status.ready = false;
            Ok(DeleteOutcome::Terminated)
        }
        Err(e) => {
            warn!(instance_id = %instance.id, error = %e, "failed to terminate instance");
            ctx.events
                .publish(
                    &machine.object_ref(),
                    EventType::Warning,
                    reasons::INSTANCE_TERMINATE_FAILED,
                    actions::DELETE,
                    Some(format!("Failed to terminate instance {}: {}", instance.id, e)),
                )
                .await;
            Err(e)
        }
    }
}

/// Look the instance up by its deterministic id once a provider ID was
/// recorded, else by tags
async fn find_instance(
    cluster: &ClusterScope,
    machine: &MachineScope,
    ctx: &Context,
) -> Result<Option<Instance>> {
    match ProviderId::parse(machine.spec.provider_id.as_deref())? {
        Some(_) => {
            let instance_id = names::instance_id(&machine.name);
            ctx.instances
                .instance_if_exists(&instance_id)
                .await
                .with_context(|| format!("failed to query instance {}", instance_id))
        }
        None => ctx
            .instances
            .get_running_instance_by_tag(cluster, machine)
            .await
            .context("failed to query instance by tags"),
    }
}

async fn deliver_bootstrap(
    cluster: &ClusterScope,
    machine: &mut MachineScope,
    instance: &Instance,
    bootstrap_data: String,
    ctx: &Context,
) -> Result<()> {
    let host = if machine.is_control_plane() {
        cluster
            .api_endpoint()
            .map(|endpoint| endpoint.host.clone())
            .ok_or_else(|| {
                Error::failed_dependency("api endpoint", "cluster has no endpoint address recorded")
            })?
    } else {
        instance.public_ip.clone().ok_or_else(|| {
            Error::failed_dependency(
                "public address",
                format!("instance {} has no public address", instance.id),
            )
        })?
    };

    let settings = &ctx.config.bootstrap;
    machine.status.bootstrap = BootstrapDelivery::Sending;
    info!(host = %host, delay = ?settings.settle_delay, "waiting for remote machine provisioning");
    tokio::time::sleep(settings.settle_delay).await;

    let request = TransferRequest {
        host: host.clone(),
        port: settings.port,
        payload: bootstrap_data.into_bytes(),
        destination: settings.destination.clone(),
        mode: settings.mode.clone(),
    };

    match ctx.transfer.copy(&request).await {
        Ok(()) => {
            machine.status.bootstrap = BootstrapDelivery::Sent;
            info!(host = %host, destination = %request.destination, "bootstrap data delivered");
            ctx.events
                .publish(
                    &machine.object_ref(),
                    EventType::Normal,
                    reasons::BOOTSTRAP_DELIVERED,
                    actions::RECONCILE,
                    Some(format!("Delivered bootstrap data to {}", host)),
                )
                .await;
            Ok(())
        }
        Err(e) => {
            machine.status.bootstrap = BootstrapDelivery::NotSent;
            warn!(host = %host, error = %e, "bootstrap delivery failed");
            Err(match e {
                Error::Transfer { .. } => e,
                other => Error::transfer(host, other.to_string()),
            })
        }
    }
}
