//! Cluster reconcile: network in, network out

use tracing::{info, instrument};

use stratus_common::{Result, ResultExt};

use super::Context;
use crate::scope::ClusterScope;

/// Converge a cluster's network and mark its infrastructure ready
#[instrument(skip(cluster, ctx), fields(cluster = %cluster.name))]
pub async fn reconcile_cluster(cluster: &mut ClusterScope, ctx: &Context) -> Result<()> {
    info!("reconciling cluster");

    ctx.network
        .reconcile_network(cluster)
        .await
        .context("failed to reconcile network")?;

    if !cluster.status.ready {
        info!("cluster infrastructure ready");
    }
    cluster.status.ready = true;
    Ok(())
}

/// Release the endpoint, then tear down the network.
///
/// Partial progress stays recorded in the status so the next pass resumes
/// where this one stopped.
#[instrument(skip(cluster, ctx), fields(cluster = %cluster.name))]
pub async fn reconcile_cluster_delete(cluster: &mut ClusterScope, ctx: &Context) -> Result<()> {
    info!("deleting cluster infrastructure");
    cluster.status.ready = false;

    ctx.network
        .delete_endpoint(cluster)
        .await
        .context("failed to delete endpoint")?;
    ctx.network
        .delete_network(cluster)
        .await
        .context("failed to delete network")?;

    info!("cluster infrastructure deleted");
    Ok(())
}
