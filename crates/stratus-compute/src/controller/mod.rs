//! Reconcile entry points for clusters and machines.
//!
//! Each entry point runs one pass over a scope and mutates its status in
//! place; requeueing and status persistence belong to the caller.

mod cluster;
mod machine;

pub use cluster::{reconcile_cluster, reconcile_cluster_delete};
pub use machine::{reconcile_machine, reconcile_machine_delete, DeleteOutcome};

use std::sync::Arc;

use stratus_common::events::{EventPublisher, NoopEventPublisher};
use stratus_common::EngineConfig;

use crate::client::ComputingClient;
use crate::instance::InstanceService;
use crate::network::NetworkService;
use crate::service::ComputingService;
use crate::transfer::FileTransfer;

/// Shared state for every reconcile pass
pub struct Context {
    /// Network convergence (trait object for testability)
    pub network: Arc<dyn NetworkService>,
    /// Instance lifecycle (trait object for testability)
    pub instances: Arc<dyn InstanceService>,
    /// Bootstrap file transfer
    pub transfer: Arc<dyn FileTransfer>,
    /// Event publisher for machine-level events
    pub events: Arc<dyn EventPublisher>,
    /// Engine configuration
    pub config: Arc<EngineConfig>,
}

impl Context {
    /// Create a builder over a cloud client and a file transfer
    pub fn builder(
        client: Arc<dyn ComputingClient>,
        transfer: Arc<dyn FileTransfer>,
        config: EngineConfig,
    ) -> ContextBuilder {
        ContextBuilder {
            client,
            transfer,
            config,
            events: None,
            network: None,
            instances: None,
        }
    }

    /// Create a context that discards events
    pub fn new(
        client: Arc<dyn ComputingClient>,
        transfer: Arc<dyn FileTransfer>,
        config: EngineConfig,
    ) -> Self {
        Self::builder(client, transfer, config).build()
    }

    /// Create a context with mocked services for unit tests
    #[cfg(test)]
    pub fn for_testing(
        network: Arc<dyn NetworkService>,
        instances: Arc<dyn InstanceService>,
        transfer: Arc<dyn FileTransfer>,
    ) -> Self {
        Self {
            network,
            instances,
            transfer,
            events: Arc::new(NoopEventPublisher),
            config: Arc::new(crate::service::testing::config()),
        }
    }
}

/// Builder for [`Context`]
pub struct ContextBuilder {
    client: Arc<dyn ComputingClient>,
    transfer: Arc<dyn FileTransfer>,
    config: EngineConfig,
    events: Option<Arc<dyn EventPublisher>>,
    network: Option<Arc<dyn NetworkService>>,
    instances: Option<Arc<dyn InstanceService>>,
}

impl ContextBuilder {
    /// Publish events through the given publisher
    pub fn events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Override network convergence (primarily for testing)
    pub fn network(mut self, network: Arc<dyn NetworkService>) -> Self {
        self.network = Some(network);
        self
    }

    /// Override the instance lifecycle (primarily for testing)
    pub fn instances(mut self, instances: Arc<dyn InstanceService>) -> Self {
        self.instances = Some(instances);
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        let config = Arc::new(self.config);
        let events = self
            .events
            .unwrap_or_else(|| Arc::new(NoopEventPublisher));
        let service = Arc::new(ComputingService::new(
            self.client,
            config.clone(),
            events.clone(),
        ));

        Context {
            network: self.network.unwrap_or_else(|| service.clone()),
            instances: self.instances.unwrap_or(service),
            transfer: self.transfer,
            events,
            config,
        }
    }
}
