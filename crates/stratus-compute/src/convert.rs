//! Mapping between provider records and the resource model.
//!
//! Decoding never assumes a field is populated: a missing required field is
//! reported as [`Error::Decode`] naming the field.

use k8s_openapi::api::core::v1::NodeAddress;

use stratus_common::{Error, Result, Tag};

use crate::client::{InstanceRecord, IpPermissionRecord, NetworkInterfaceRecord, SecurityGroupRecord};
use crate::model::{IngressRule, IngressRules, Instance, InstanceState, Protocol, SecurityGroup};

fn required<'a>(value: &'a Option<String>, resource: &str, field: &str) -> Result<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| Error::decode(resource, field))
}

fn port(value: Option<i32>, resource: &str, field: &str) -> Result<u16> {
    let raw = value.ok_or_else(|| Error::decode(resource, field))?;
    u16::try_from(raw).map_err(|_| {
        Error::validation_for_field(resource, field, format!("port {} is out of range", raw))
    })
}

/// Decode an ingress permission
pub fn decode_ingress_rule(record: &IpPermissionRecord) -> Result<IngressRule> {
    let protocol = Protocol::from(required(&record.ip_protocol, "ingress rule", "ipProtocol")?.to_string());

    let (from_port, to_port) = if protocol.has_ports() {
        (
            port(record.from_port, "ingress rule", "fromPort")?,
            port(record.to_port, "ingress rule", "toPort")?,
        )
    } else {
        (0, 0)
    };

    Ok(IngressRule {
        protocol,
        from_port,
        to_port,
        description: record.description.clone().unwrap_or_default(),
        cidr_blocks: record.ip_ranges.iter().cloned().collect(),
        source_security_groups: record.groups.iter().cloned().collect(),
    })
}

/// Encode an ingress rule; ports are only sent for TCP and UDP
pub fn encode_ingress_rule(rule: &IngressRule) -> IpPermissionRecord {
    let (from_port, to_port) = if rule.protocol.has_ports() {
        (Some(i32::from(rule.from_port)), Some(i32::from(rule.to_port)))
    } else {
        (None, None)
    };

    IpPermissionRecord {
        ip_protocol: Some(rule.protocol.as_str().to_string()),
        from_port,
        to_port,
        description: Some(rule.description.clone()),
        ip_ranges: rule.cidr_blocks.iter().cloned().collect(),
        groups: rule.source_security_groups.iter().cloned().collect(),
    }
}

/// Encode a rule collection for an authorize or revoke request
pub fn encode_ingress_rules(rules: &IngressRules) -> Vec<IpPermissionRecord> {
    rules.iter().map(encode_ingress_rule).collect()
}

/// Decode a security group with its attached rules
pub fn decode_security_group(record: &SecurityGroupRecord) -> Result<SecurityGroup> {
    let name = required(&record.group_name, "security group", "groupName")?;
    let ingress_rules = record
        .ip_permissions
        .iter()
        .map(decode_ingress_rule)
        .collect::<Result<IngressRules>>()?;

    Ok(SecurityGroup {
        id: name.to_string(),
        name: name.to_string(),
        ingress_rules,
    })
}

/// Node addresses for every network interface.
///
/// Each interface yields InternalDNS and InternalIP; an interface with a
/// public association also yields ExternalDNS and ExternalIP.
pub fn node_addresses(interfaces: &[NetworkInterfaceRecord]) -> Result<Vec<NodeAddress>> {
    let mut addresses = Vec::with_capacity(interfaces.len() * 2);
    for ni in interfaces {
        addresses.push(NodeAddress {
            type_: "InternalDNS".to_string(),
            address: required(&ni.private_dns_name, "network interface", "privateDnsName")?
                .to_string(),
        });
        addresses.push(NodeAddress {
            type_: "InternalIP".to_string(),
            address: required(&ni.private_ip_address, "network interface", "privateIpAddress")?
                .to_string(),
        });

        if let Some(association) = &ni.association {
            if let Some(dns) = &association.public_dns_name {
                addresses.push(NodeAddress {
                    type_: "ExternalDNS".to_string(),
                    address: dns.clone(),
                });
            }
            addresses.push(NodeAddress {
                type_: "ExternalIP".to_string(),
                address: required(&association.public_ip, "network interface", "association.publicIp")?
                    .to_string(),
            });
        }
    }
    Ok(addresses)
}

/// Decode an instance record
pub fn decode_instance(record: &InstanceRecord) -> Result<Instance> {
    const KIND: &str = "instance";

    Ok(Instance {
        uid: required(&record.instance_unique_id, KIND, "instanceUniqueId")?.to_string(),
        id: required(&record.instance_id, KIND, "instanceId")?.to_string(),
        zone: required(&record.availability_zone, KIND, "placement.availabilityZone")?.to_string(),
        state: InstanceState::from(required(&record.instance_state, KIND, "instanceState.name")?),
        instance_type: required(&record.instance_type, KIND, "instanceType")?.to_string(),
        image_id: required(&record.image_id, KIND, "imageId")?.to_string(),
        user_data: record.user_data.clone(),
        security_groups: record.security_groups.clone(),
        ssh_key_name: record.key_name.clone(),
        tags: Tag::parse(record.description.as_deref().unwrap_or_default()),
        public_ip: record.ip_address.clone().filter(|ip| !ip.is_empty()),
        private_ip: record.private_ip_address.clone().filter(|ip| !ip.is_empty()),
        addresses: node_addresses(&record.network_interfaces)?,
        network_interface_ids: record
            .network_interfaces
            .iter()
            .filter_map(|ni| ni.network_interface_id.clone())
            .collect(),
    })
}
