//! The computing service shared by network and instance convergence

use std::future::Future;
use std::sync::Arc;

use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::EventType;

use stratus_common::codes;
use stratus_common::events::EventPublisher;
use stratus_common::retry::wait_for_with_retryable;
use stratus_common::{EngineConfig, Result};

use crate::client::ComputingClient;

/// Convergence operations over one cloud account.
///
/// Holds no per-resource state: every call receives the scope it mutates,
/// so one service can serve concurrent reconciles of different resources.
pub struct ComputingService {
    pub(crate) client: Arc<dyn ComputingClient>,
    pub(crate) config: Arc<EngineConfig>,
    pub(crate) events: Arc<dyn EventPublisher>,
}

impl ComputingService {
    /// Create a service over the given client
    pub fn new(
        client: Arc<dyn ComputingClient>,
        config: Arc<EngineConfig>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            client,
            config,
            events,
        }
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run a group mutation, backing off while the group is still processing
    pub(crate) async fn retry_while_processing<F, Fut>(
        &self,
        operation: &str,
        mut mutate: F,
    ) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        wait_for_with_retryable(
            &self.config.backoff,
            operation,
            || {
                let attempt = mutate();
                async move { attempt.await.map(|()| true) }
            },
            &[codes::SECURITY_GROUP_PROCESSING],
        )
        .await
    }

    pub(crate) async fn publish_normal(
        &self,
        resource: &ObjectReference,
        reason: &str,
        action: &str,
        note: String,
    ) {
        self.events
            .publish(resource, EventType::Normal, reason, action, Some(note))
            .await;
    }

    pub(crate) async fn publish_warning(
        &self,
        resource: &ObjectReference,
        reason: &str,
        action: &str,
        note: String,
    ) {
        self.events
            .publish(resource, EventType::Warning, reason, action, Some(note))
            .await;
    }
}
