//! File-transfer seam used for the bootstrap hand-off.
//!
//! The secure copy transport (SSH keys, host verification) lives outside
//! this crate.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use stratus_common::Result;

/// A single file copy onto a remote host
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferRequest {
    /// Target host address
    pub host: String,
    /// Target port
    pub port: u16,
    /// File contents
    pub payload: Vec<u8>,
    /// Absolute destination path
    pub destination: String,
    /// File mode, e.g. "0655"
    pub mode: String,
}

/// Performs one authenticated copy per call
#[cfg_attr(test, automock)]
#[async_trait]
pub trait FileTransfer: Send + Sync {
    /// Copy the payload to the host
    ///
    /// Failures should be reported as [`stratus_common::Error::Transfer`].
    async fn copy(&self, request: &TransferRequest) -> Result<()>;
}
