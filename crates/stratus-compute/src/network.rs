//! Network convergence: security groups, their ingress rules, and the
//! cluster's API endpoint address.
//!
//! Every step reads the account first and only mutates what differs, so a
//! second pass over a converged cluster makes no mutating calls.

use std::collections::BTreeMap;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tracing::{debug, info, warn};

use stratus_common::codes;
use stratus_common::events::{actions, reasons};
use stratus_common::{Error, Result, ResultExt, Tag};

use crate::convert;
use crate::model::{
    ApiEndpoint, IngressRule, IngressRules, SecurityGroup, SecurityGroupOwner, SecurityGroupRole,
    API_ENDPOINT_PORT,
};
use crate::names;
use crate::scope::ClusterScope;
use crate::service::ComputingService;

/// Role tag carried by the endpoint address
pub const ENDPOINT_ROLE: &str = "endpoint";

/// Network operations on a cluster
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NetworkService: Send + Sync {
    /// Converge security groups, their rules, and the API endpoint
    async fn reconcile_network(&self, cluster: &mut ClusterScope) -> Result<()>;

    /// Revoke recorded rules and delete recorded groups
    async fn delete_network(&self, cluster: &mut ClusterScope) -> Result<()>;

    /// Release recorded endpoint addresses
    async fn delete_endpoint(&self, cluster: &mut ClusterScope) -> Result<()>;
}

#[async_trait]
impl NetworkService for ComputingService {
    async fn reconcile_network(&self, cluster: &mut ClusterScope) -> Result<()> {
        info!(cluster = %cluster.name, "Reconciling network");

        self.reconcile_security_groups(cluster).await?;
        self.reconcile_endpoint(cluster).await?;

        info!(cluster = %cluster.name, "Network reconciled");
        Ok(())
    }

    async fn delete_network(&self, cluster: &mut ClusterScope) -> Result<()> {
        info!(cluster = %cluster.name, "Deleting network");
        self.delete_security_groups(cluster).await
    }

    async fn delete_endpoint(&self, cluster: &mut ClusterScope) -> Result<()> {
        while let Some(endpoint) = cluster.status.api_endpoints.first().cloned() {
            self.client
                .release_address(&endpoint.host)
                .await
                .with_context(|| format!("failed to release endpoint address {}", endpoint.host))?;
            info!(cluster = %cluster.name, address = %endpoint.host, "Released endpoint address");
            cluster.status.api_endpoints.remove(0);
        }
        Ok(())
    }
}

impl ComputingService {
    // =========================================================================
    // Security groups
    // =========================================================================

    async fn reconcile_security_groups(&self, cluster: &mut ClusterScope) -> Result<()> {
        let existing = self.describe_cluster_security_groups(&cluster.name).await?;

        for role in SecurityGroupRole::MANAGED {
            let name = names::security_group_name(&cluster.name, role.as_str());
            let group = match existing.get(&name) {
                Some(group) => {
                    debug!(cluster = %cluster.name, group = %name, "Adopting existing security group");
                    group.clone()
                }
                None => {
                    self.create_security_group(cluster, role, &name).await?;
                    SecurityGroup {
                        id: name.clone(),
                        name,
                        ingress_rules: IngressRules::default(),
                    }
                }
            };
            cluster.status.network.security_groups.insert(role, group);
        }

        for role in SecurityGroupRole::MANAGED {
            let Some(group) = cluster.security_group(role).cloned() else {
                continue;
            };
            let desired = self
                .desired_ingress_rules(role)?
                .without_source_group(&group.name);
            let current = &group.ingress_rules;

            let to_revoke = current.difference(&desired);
            if !to_revoke.is_empty() {
                info!(group = %group.name, rules = %to_revoke, "Revoking stale ingress rules");
                let result = self.revoke_ingress(&group.name, &to_revoke).await;
                self.publish_ingress_change(cluster, &group.name, &to_revoke, &result, reasons::INGRESS_REVOKED)
                    .await;
                result.with_context(|| {
                    format!("failed to revoke ingress rules of security group {}", group.name)
                })?;
            }

            let to_authorize = desired.difference(current);
            if !to_authorize.is_empty() {
                info!(group = %group.name, rules = %to_authorize, "Authorizing ingress rules");
                let result = self.authorize_ingress(&group.name, &to_authorize).await;
                self.publish_ingress_change(
                    cluster,
                    &group.name,
                    &to_authorize,
                    &result,
                    reasons::INGRESS_AUTHORIZED,
                )
                .await;
                result.with_context(|| {
                    format!("failed to authorize ingress rules of security group {}", group.name)
                })?;
            }

            if let Some(recorded) = cluster.status.network.security_groups.get_mut(&role) {
                recorded.ingress_rules = desired;
            }
        }

        Ok(())
    }

    async fn describe_cluster_security_groups(
        &self,
        cluster_name: &str,
    ) -> Result<BTreeMap<String, SecurityGroup>> {
        let prefix = names::security_group_prefix(cluster_name);
        let records = self
            .client
            .describe_security_groups(&prefix)
            .await
            .context("failed to describe security groups")?;

        records
            .iter()
            .map(|record| convert::decode_security_group(record).map(|g| (g.name.clone(), g)))
            .collect()
    }

    async fn create_security_group(
        &self,
        cluster: &ClusterScope,
        role: SecurityGroupRole,
        name: &str,
    ) -> Result<()> {
        let description = SecurityGroupOwner {
            cluster: cluster.name.clone(),
            role: role.to_string(),
        }
        .to_description()?;

        match self.client.create_security_group(name, &description).await {
            Ok(()) => {
                info!(cluster = %cluster.name, group = %name, role = %role, "Created security group");
                self.publish_normal(
                    &cluster.object_ref(),
                    reasons::SECURITY_GROUP_CREATED,
                    actions::CREATE,
                    format!("Created {} security group {}", role, name),
                )
                .await;
                Ok(())
            }
            Err(e) => {
                warn!(cluster = %cluster.name, group = %name, error = %e, "Failed to create security group");
                self.publish_warning(
                    &cluster.object_ref(),
                    reasons::SECURITY_GROUP_CREATE_FAILED,
                    actions::CREATE,
                    format!("Failed to create {} security group {}: {}", role, name, e),
                )
                .await;
                Err(e.context(format!("failed to create security group for role {}", role)))
            }
        }
    }

    /// Rules each managed role must carry, all sourced from the operator address
    fn desired_ingress_rules(&self, role: SecurityGroupRole) -> Result<IngressRules> {
        let source = self.config.operator_address.to_string();
        match role {
            SecurityGroupRole::ControlPlane | SecurityGroupRole::Node => Ok([
                IngressRule::tcp("SSH", 22, &[&source]),
                IngressRule::tcp("Kubernetes API", API_ENDPOINT_PORT, &[&source]),
            ]
            .into_iter()
            .collect()),
            SecurityGroupRole::Bastion => Err(Error::validation_for(
                "security group",
                format!("cannot determine ingress rules for unmanaged role {}", role),
            )),
        }
    }

    async fn authorize_ingress(&self, group_name: &str, rules: &IngressRules) -> Result<()> {
        let permissions = convert::encode_ingress_rules(rules);
        let permissions = permissions.as_slice();
        let client = self.client.as_ref();
        self.retry_while_processing("authorize security group ingress", move || {
            client.authorize_security_group_ingress(group_name, permissions)
        })
        .await
    }

    async fn revoke_ingress(&self, group_name: &str, rules: &IngressRules) -> Result<()> {
        let permissions = convert::encode_ingress_rules(rules);
        let permissions = permissions.as_slice();
        let client = self.client.as_ref();
        self.retry_while_processing("revoke security group ingress", move || {
            client.revoke_security_group_ingress(group_name, permissions)
        })
        .await
    }

    async fn delete_group(&self, group_name: &str) -> Result<()> {
        let client = self.client.as_ref();
        self.retry_while_processing("delete security group", move || {
            client.delete_security_group(group_name)
        })
        .await
    }

    async fn publish_ingress_change(
        &self,
        cluster: &ClusterScope,
        group_name: &str,
        rules: &IngressRules,
        result: &Result<()>,
        success_reason: &str,
    ) {
        match result {
            Ok(()) => {
                self.publish_normal(
                    &cluster.object_ref(),
                    success_reason,
                    actions::RECONCILE,
                    format!("Security group {}: {}", group_name, rules),
                )
                .await
            }
            Err(e) => {
                self.publish_warning(
                    &cluster.object_ref(),
                    reasons::INGRESS_UPDATE_FAILED,
                    actions::RECONCILE,
                    format!("Security group {}: {}", group_name, e),
                )
                .await
            }
        }
    }

    /// Revoke recorded rules, then delete recorded groups.
    ///
    /// Groups or rules already gone count as deleted. Every group is
    /// attempted; failures are returned together.
    async fn delete_security_groups(&self, cluster: &mut ClusterScope) -> Result<()> {
        let groups: Vec<(SecurityGroupRole, SecurityGroup)> = cluster
            .status
            .network
            .security_groups
            .iter()
            .map(|(role, group)| (*role, group.clone()))
            .collect();
        let mut failures = Vec::new();

        for (role, group) in &groups {
            if group.ingress_rules.is_empty() {
                continue;
            }
            let result = self.revoke_ingress(&group.name, &group.ingress_rules).await;
            match codes::ignore_security_group_not_found(result) {
                Ok(()) => {
                    debug!(group = %group.name, "Revoked ingress rules");
                    if let Some(recorded) = cluster.status.network.security_groups.get_mut(role) {
                        recorded.ingress_rules = IngressRules::default();
                    }
                }
                Err(e) => {
                    warn!(group = %group.name, error = %e, "Failed to revoke ingress rules");
                    failures.push(e.context(format!(
                        "failed to revoke ingress rules of security group {}",
                        group.name
                    )));
                }
            }
        }

        for (role, group) in &groups {
            match codes::ignore_security_group_not_found(self.delete_group(&group.name).await) {
                Ok(()) => {
                    info!(cluster = %cluster.name, group = %group.name, "Deleted security group");
                    cluster.status.network.security_groups.remove(role);
                }
                Err(e) => {
                    warn!(cluster = %cluster.name, group = %group.name, error = %e, "Failed to delete security group");
                    self.publish_warning(
                        &cluster.object_ref(),
                        reasons::SECURITY_GROUP_DELETE_FAILED,
                        actions::DELETE,
                        format!("Failed to delete security group {}: {}", group.name, e),
                    )
                    .await;
                    failures.push(e.context(format!("failed to delete security group {}", group.name)));
                }
            }
        }

        Error::aggregate(failures)
    }

    // =========================================================================
    // Endpoint
    // =========================================================================

    async fn reconcile_endpoint(&self, cluster: &mut ClusterScope) -> Result<()> {
        if let Some(endpoint) = cluster.api_endpoint() {
            debug!(cluster = %cluster.name, host = %endpoint.host, "Endpoint already recorded");
            return Ok(());
        }

        let host = self
            .get_or_allocate_address(cluster)
            .await
            .context("failed to get or allocate endpoint address")?;
        cluster.status.api_endpoints.push(ApiEndpoint {
            host,
            port: API_ENDPOINT_PORT,
        });
        Ok(())
    }

    /// Reuse the cluster's endpoint address if one exists, else allocate one.
    ///
    /// Ownership is read from the address description, so an address
    /// allocated by an earlier pass whose status was lost is found again.
    pub async fn get_or_allocate_address(&self, cluster: &ClusterScope) -> Result<String> {
        let owner = Tag::build(&cluster.name, Some(ENDPOINT_ROLE), None);

        let addresses = self
            .client
            .describe_addresses()
            .await
            .context("failed to describe addresses")?;
        let reusable = addresses
            .iter()
            .filter(|a| Tag::parse(a.description.as_deref().unwrap_or_default()).contains_all(&owner))
            .find_map(|a| a.public_ip.clone().filter(|ip| !ip.is_empty()));
        if let Some(address) = reusable {
            info!(cluster = %cluster.name, address = %address, "Reusing endpoint address");
            return Ok(address);
        }

        let description = owner.encode()?;
        let address = self
            .client
            .allocate_address(&cluster.spec.zone, &cluster.spec.region, &description)
            .await?;

        info!(cluster = %cluster.name, address = %address, "Allocated endpoint address");
        self.publish_normal(
            &cluster.object_ref(),
            reasons::ENDPOINT_ALLOCATED,
            actions::CREATE,
            format!("Allocated endpoint address {}", address),
        )
        .await;
        Ok(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{AddressRecord, IpPermissionRecord, MockComputingClient, SecurityGroupRecord};
    use crate::service::testing::{self, OPERATOR};

    fn group_name() -> String {
        names::security_group_name("prod", "controlplane")
    }

    fn desired_permissions() -> Vec<IpPermissionRecord> {
        let source = OPERATOR.to_string();
        vec![
            convert::encode_ingress_rule(&IngressRule::tcp("SSH", 22, &[&source])),
            convert::encode_ingress_rule(&IngressRule::tcp("Kubernetes API", 6443, &[&source])),
        ]
    }

    fn group_record(permissions: Vec<IpPermissionRecord>) -> SecurityGroupRecord {
        SecurityGroupRecord {
            group_name: Some(group_name()),
            description: Some(r#"{"cluster":"prod","role":"controlplane"}"#.to_string()),
            ip_permissions: permissions,
        }
    }

    fn address(ip: &str, description: &str) -> AddressRecord {
        AddressRecord {
            public_ip: Some(ip.to_string()),
            instance_id: None,
            description: Some(description.to_string()),
        }
    }

    // =========================================================================
    // Reconcile Stories
    // =========================================================================

    /// Story: An empty account gets one group with the two operator rules
    /// and one endpoint address
    #[tokio::test]
    async fn story_empty_account_converges_in_one_pass() {
        let mut client = MockComputingClient::new();
        client
            .expect_describe_security_groups()
            .withf(|prefix| prefix == "prod")
            .returning(|_| Ok(vec![]));
        client
            .expect_create_security_group()
            .withf(|name, description| {
                name == group_name() && description == r#"{"cluster":"prod","role":"controlplane"}"#
            })
            .times(1)
            .returning(|_, _| Ok(()));
        client
            .expect_authorize_security_group_ingress()
            .withf(|name, permissions| name == group_name() && permissions.len() == 2)
            .times(1)
            .returning(|_, _| Ok(()));
        client.expect_revoke_security_group_ingress().never();
        client.expect_describe_addresses().returning(|| Ok(vec![]));
        client
            .expect_allocate_address()
            .withf(|zone, region, description| {
                zone == "east-11" && region == "jp-east-1" && description == "cluster:prod,role:endpoint"
            })
            .times(1)
            .returning(|_, _, _| Ok("198.51.100.20".to_string()));

        let service = testing::service(client);
        let mut cluster = testing::cluster();
        service.reconcile_network(&mut cluster).await.unwrap();

        let group = cluster.security_group(SecurityGroupRole::ControlPlane).unwrap();
        assert_eq!(group.name, group_name());
        assert_eq!(group.ingress_rules.len(), 2);
        assert_eq!(
            cluster.status.api_endpoints,
            vec![ApiEndpoint {
                host: "198.51.100.20".to_string(),
                port: 6443
            }]
        );
    }

    /// Story: A converged account makes no mutating calls
    #[tokio::test]
    async fn story_converged_account_is_left_alone() {
        let mut client = MockComputingClient::new();
        client
            .expect_describe_security_groups()
            .returning(|_| Ok(vec![group_record(desired_permissions())]));
        client.expect_create_security_group().never();
        client.expect_authorize_security_group_ingress().never();
        client.expect_revoke_security_group_ingress().never();
        client.expect_describe_addresses().never();
        client.expect_allocate_address().never();

        let service = testing::service(client);
        let mut cluster = testing::ready_cluster();
        service.reconcile_network(&mut cluster).await.unwrap();

        let group = cluster.security_group(SecurityGroupRole::ControlPlane).unwrap();
        assert_eq!(group.ingress_rules.len(), 2);
        assert_eq!(cluster.status.api_endpoints.len(), 1);
    }

    /// Story: The operator moved; the rule for the old address is revoked
    /// and the new one authorized, leaving the unchanged rule alone
    #[tokio::test]
    async fn story_operator_address_change_replaces_only_stale_rule() {
        let stale = convert::encode_ingress_rule(&IngressRule::tcp("SSH", 22, &["192.0.2.1"]));
        let kept = desired_permissions()[1].clone();

        let mut client = MockComputingClient::new();
        client
            .expect_describe_security_groups()
            .returning(move |_| Ok(vec![group_record(vec![stale.clone(), kept.clone()])]));
        client
            .expect_revoke_security_group_ingress()
            .withf(|_, permissions| {
                permissions.len() == 1 && permissions[0].ip_ranges == vec!["192.0.2.1".to_string()]
            })
            .times(1)
            .returning(|_, _| Ok(()));
        client
            .expect_authorize_security_group_ingress()
            .withf(|_, permissions| permissions.len() == 1 && permissions[0].from_port == Some(22))
            .times(1)
            .returning(|_, _| Ok(()));

        let service = testing::service(client);
        let mut cluster = testing::ready_cluster();
        service.reconcile_network(&mut cluster).await.unwrap();
    }

    /// Story: A group still processing an earlier change is retried until
    /// the provider accepts the mutation
    #[tokio::test]
    async fn story_processing_group_is_retried() {
        let mut client = MockComputingClient::new();
        client
            .expect_describe_security_groups()
            .returning(|_| Ok(vec![group_record(vec![])]));
        let mut calls = 0;
        client
            .expect_authorize_security_group_ingress()
            .times(3)
            .returning(move |_, _| {
                calls += 1;
                if calls < 3 {
                    Err(Error::api(codes::SECURITY_GROUP_PROCESSING, "group is processing"))
                } else {
                    Ok(())
                }
            });

        let service = testing::service(client);
        let mut cluster = testing::ready_cluster();
        service.reconcile_network(&mut cluster).await.unwrap();
    }

    /// Story: Any other authorize failure stops the pass immediately
    #[tokio::test]
    async fn story_fatal_authorize_failure_is_not_retried() {
        let mut client = MockComputingClient::new();
        client
            .expect_describe_security_groups()
            .returning(|_| Ok(vec![group_record(vec![])]));
        client
            .expect_authorize_security_group_ingress()
            .times(1)
            .returning(|_, _| Err(Error::api(codes::AUTH_FAILURE, "denied")));

        let service = testing::service(client);
        let mut cluster = testing::ready_cluster();
        let err = service.reconcile_network(&mut cluster).await.unwrap_err();

        assert_eq!(err.code(), Some(codes::AUTH_FAILURE));
        let group = cluster.security_group(SecurityGroupRole::ControlPlane).unwrap();
        assert!(group.ingress_rules.is_empty());
    }

    #[tokio::test]
    async fn test_create_failure_is_reported_with_role() {
        let mut client = MockComputingClient::new();
        client.expect_describe_security_groups().returning(|_| Ok(vec![]));
        client
            .expect_create_security_group()
            .returning(|_, _| Err(Error::api(codes::AUTH_FAILURE, "denied")));

        let service = testing::service(client);
        let mut cluster = testing::cluster();
        let err = service.reconcile_network(&mut cluster).await.unwrap_err();

        assert!(err.to_string().contains("controlplane"));
        assert!(cluster.status.network.security_groups.is_empty());
    }

    #[tokio::test]
    async fn test_bastion_rules_are_not_defined() {
        let service = testing::service(MockComputingClient::new());
        assert!(matches!(
            service.desired_ingress_rules(SecurityGroupRole::Bastion),
            Err(Error::Validation { .. })
        ));
    }

    // =========================================================================
    // Endpoint Stories
    // =========================================================================

    /// Story: An address allocated by a pass whose status was lost is
    /// reused instead of leaking a second one
    #[tokio::test]
    async fn story_owned_address_is_reused() {
        let mut client = MockComputingClient::new();
        client.expect_describe_addresses().returning(|| {
            Ok(vec![
                address("192.0.2.50", "cluster:staging,role:endpoint"),
                address("192.0.2.51", ""),
                address("192.0.2.52", "cluster:prod,role:endpoint"),
            ])
        });
        client.expect_allocate_address().never();

        let service = testing::service(client);
        let address = service
            .get_or_allocate_address(&testing::cluster())
            .await
            .unwrap();
        assert_eq!(address, "192.0.2.52");
    }

    #[tokio::test]
    async fn test_allocate_failure_records_no_endpoint() {
        let mut client = MockComputingClient::new();
        client.expect_describe_security_groups().returning(|_| Ok(vec![group_record(desired_permissions())]));
        client.expect_describe_addresses().returning(|| Ok(vec![]));
        client
            .expect_allocate_address()
            .returning(|_, _, _| Err(Error::api("Client.Quota", "address quota exceeded")));

        let service = testing::service(client);
        let mut cluster = testing::cluster();
        let err = service.reconcile_network(&mut cluster).await.unwrap_err();

        assert_eq!(err.code(), Some("Client.Quota"));
        assert!(cluster.status.api_endpoints.is_empty());
    }

    /// Story: Release stops at the first failure and keeps what is left
    /// recorded for the next pass
    #[tokio::test]
    async fn story_endpoint_release_stops_at_first_failure() {
        let mut client = MockComputingClient::new();
        client
            .expect_release_address()
            .withf(|ip| ip == "198.51.100.20")
            .times(1)
            .returning(|_| Ok(()));
        client
            .expect_release_address()
            .withf(|ip| ip == "198.51.100.21")
            .times(1)
            .returning(|_| Err(Error::api(codes::AUTH_FAILURE, "denied")));

        let service = testing::service(client);
        let mut cluster = testing::ready_cluster();
        cluster.status.api_endpoints.push(ApiEndpoint {
            host: "198.51.100.21".to_string(),
            port: 6443,
        });

        assert!(service.delete_endpoint(&mut cluster).await.is_err());
        assert_eq!(cluster.status.api_endpoints.len(), 1);
        assert_eq!(cluster.status.api_endpoints[0].host, "198.51.100.21");
    }

    // =========================================================================
    // Teardown Stories
    // =========================================================================

    fn cluster_with_rules() -> ClusterScope {
        let mut cluster = testing::ready_cluster();
        let rules = desired_permissions()
            .iter()
            .map(convert::decode_ingress_rule)
            .collect::<Result<IngressRules>>()
            .unwrap();
        if let Some(group) = cluster
            .status
            .network
            .security_groups
            .get_mut(&SecurityGroupRole::ControlPlane)
        {
            group.ingress_rules = rules;
        }
        cluster
    }

    /// Story: Rules and groups already removed out-of-band count as deleted
    #[tokio::test]
    async fn story_teardown_tolerates_already_deleted() {
        let mut client = MockComputingClient::new();
        client
            .expect_revoke_security_group_ingress()
            .times(1)
            .returning(|_, _| Err(Error::api(codes::PERMISSION_NOT_FOUND, "gone")));
        client
            .expect_delete_security_group()
            .times(1)
            .returning(|_| Err(Error::api(codes::GROUP_NOT_FOUND, "gone")));

        let service = testing::service(client);
        let mut cluster = cluster_with_rules();
        service.delete_network(&mut cluster).await.unwrap();
        assert!(cluster.status.network.security_groups.is_empty());
    }

    /// Story: Every group is attempted and all failures come back together
    #[tokio::test]
    async fn story_teardown_aggregates_failures() {
        let mut client = MockComputingClient::new();
        client
            .expect_revoke_security_group_ingress()
            .returning(|_, _| Err(Error::api(codes::AUTH_FAILURE, "denied")));
        client
            .expect_delete_security_group()
            .times(2)
            .returning(|name| {
                if name.starts_with("prod") {
                    Err(Error::api(codes::AUTH_FAILURE, "denied"))
                } else {
                    Ok(())
                }
            });

        let service = testing::service(client);
        let mut cluster = cluster_with_rules();
        cluster.status.network.security_groups.insert(
            SecurityGroupRole::Node,
            SecurityGroup {
                id: "legacy-node".to_string(),
                name: "legacy-node".to_string(),
                ingress_rules: IngressRules::default(),
            },
        );

        let err = service.delete_network(&mut cluster).await.unwrap_err();
        match err {
            Error::Aggregate(errors) => assert_eq!(errors.len(), 2),
            other => panic!("Expected Aggregate, got {:?}", other),
        }
        assert!(cluster.security_group(SecurityGroupRole::ControlPlane).is_some());
        assert!(cluster.security_group(SecurityGroupRole::Node).is_none());
    }

    #[tokio::test]
    async fn test_teardown_clears_revoked_rules() {
        let mut client = MockComputingClient::new();
        client
            .expect_revoke_security_group_ingress()
            .returning(|_, _| Ok(()));
        client
            .expect_delete_security_group()
            .returning(|_| Err(Error::api(codes::SECURITY_GROUP_PROCESSING, "still processing")));

        let service = testing::service(client);
        let mut cluster = cluster_with_rules();

        let err = service.delete_network(&mut cluster).await.unwrap_err();
        assert_eq!(err.code(), Some(codes::SECURITY_GROUP_PROCESSING));
        let group = cluster.security_group(SecurityGroupRole::ControlPlane).unwrap();
        assert!(group.ingress_rules.is_empty());
    }
}
