//! Kubernetes Events on the cluster and machine resources.
//!
//! Group creation, rule changes, address allocation and the instance
//! lifecycle are reported as Events so that `kubectl describe` on the owning
//! resource shows what the engine did to the cloud account.
//!
//! Publishing never fails the caller: a rejected Event is logged and dropped.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Longest note the events API accepts, in bytes
pub const MAX_NOTE_BYTES: usize = 1024;

/// Sink for Events about engine-managed resources.
///
/// `publish` has no error path; implementations log their own failures.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Record an Event on `resource_ref`.
    ///
    /// `reason` is one of [`reasons`], `action` one of [`actions`]. The note
    /// usually carries the cloud identifier or the error text.
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Publisher backed by the kube runtime [`Recorder`]
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Publisher reporting as `controller_name` (e.g. "stratus-machine-controller")
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: None,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note: note.map(truncate_note),
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(
                reason,
                action,
                resource = ?resource_ref.name,
                error = %e,
                "Dropping event the API server rejected"
            );
        }
    }
}

/// Cut a note to [`MAX_NOTE_BYTES`] on a character boundary.
///
/// Aggregated teardown errors can run past the limit, and the API server
/// rejects the whole Event rather than trimming it.
fn truncate_note(mut note: String) -> String {
    if note.len() <= MAX_NOTE_BYTES {
        return note;
    }
    let mut end = MAX_NOTE_BYTES;
    while !note.is_char_boundary(end) {
        end -= 1;
    }
    note.truncate(end);
    note
}

/// Publisher that discards everything
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Event reasons (the REASON column of `kubectl get events`)
pub mod reasons {
    // Network
    /// A managed security group was created
    pub const SECURITY_GROUP_CREATED: &str = "SecurityGroupCreated";
    /// Creating a managed security group failed
    pub const SECURITY_GROUP_CREATE_FAILED: &str = "SecurityGroupCreateFailed";
    /// Ingress rules were authorized on a group
    pub const INGRESS_AUTHORIZED: &str = "IngressAuthorized";
    /// Ingress rules were revoked from a group
    pub const INGRESS_REVOKED: &str = "IngressRevoked";
    /// Authorizing or revoking ingress rules failed
    pub const INGRESS_UPDATE_FAILED: &str = "IngressUpdateFailed";
    /// Deleting a managed security group failed
    pub const SECURITY_GROUP_DELETE_FAILED: &str = "SecurityGroupDeleteFailed";
    /// A floating address was allocated for the API endpoint
    pub const ENDPOINT_ALLOCATED: &str = "EndpointAllocated";

    // Instances
    /// An instance was created and is running
    pub const INSTANCE_CREATED: &str = "InstanceCreated";
    /// Creating an instance failed
    pub const INSTANCE_CREATE_FAILED: &str = "InstanceCreateFailed";
    /// An instance was terminated
    pub const INSTANCE_TERMINATED: &str = "InstanceTerminated";
    /// Terminating an instance failed
    pub const INSTANCE_TERMINATE_FAILED: &str = "InstanceTerminateFailed";
    /// The instance was already gone when deletion ran
    pub const INSTANCE_NOT_FOUND: &str = "InstanceNotFound";
    /// Bootstrap data was delivered to the instance
    pub const BOOTSTRAP_DELIVERED: &str = "BootstrapDelivered";
}

/// Event actions (the ACTION column of `kubectl get events`)
pub mod actions {
    /// Converging existing resources
    pub const RECONCILE: &str = "Reconcile";
    /// Creating cloud resources
    pub const CREATE: &str = "Create";
    /// Deleting cloud resources
    pub const DELETE: &str = "Delete";
}
