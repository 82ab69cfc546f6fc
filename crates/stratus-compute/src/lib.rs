//! Convergence engine for stratus clusters
//!
//! Brings a cloud account in line with a cluster's desired infrastructure:
//! security groups and their ingress rules, the API endpoint address, and
//! one compute instance per machine, bootstrapped over a file transfer.
//!
//! Related crates:
//! - `stratus-common`: errors, retry, tags, configuration and telemetry

pub mod client;
pub mod controller;
pub mod convert;
pub mod instance;
pub mod model;
pub mod names;
pub mod network;
pub mod scope;
pub mod service;
pub mod transfer;
pub mod userdata;

// Re-export controller types
pub use controller::{
    reconcile_cluster, reconcile_cluster_delete, reconcile_machine, reconcile_machine_delete,
    Context, ContextBuilder, DeleteOutcome,
};

// Re-export the seams
pub use client::ComputingClient;
pub use instance::InstanceService;
pub use network::NetworkService;
pub use service::ComputingService;
pub use transfer::{FileTransfer, TransferRequest};

// Re-export common error types
pub use stratus_common::{Error, Result};
