//! Deterministic resource names.
//!
//! Group names and instance ids are recomputed from the cluster and machine
//! names on every pass, so no identifier has to be persisted before the
//! resource exists.

/// Maximum length of a security group name or instance id
pub const MAX_NAME_LENGTH: usize = 15;

/// Characters of the cluster name kept at the front of a group name
const GROUP_PREFIX_LENGTH: usize = 7;

fn digest_hex(input: &str) -> String {
    use aws_lc_rs::digest;
    let hash = digest::digest(&digest::SHA256, input.as_bytes());
    hash.as_ref()
        .iter()
        .fold(String::with_capacity(64), |mut s, b| {
            use std::fmt::Write;
            let _ = write!(s, "{:02x}", b);
            s
        })
}

/// Name prefix shared by every group of a cluster, used for discovery
pub fn security_group_prefix(cluster_name: &str) -> String {
    cluster_name
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(GROUP_PREFIX_LENGTH)
        .collect()
}

/// Security group name for a cluster role
///
/// The cluster prefix keeps groups recognizable in the console; the hash of
/// the full `(cluster, role)` pair keeps long cluster names from colliding.
pub fn security_group_name(cluster_name: &str, role: &str) -> String {
    let mut name = security_group_prefix(cluster_name);
    let hash = digest_hex(&format!("{}/{}", cluster_name, role));
    let remaining = MAX_NAME_LENGTH - name.len();
    name.push_str(&hash[..remaining]);
    name
}

/// Instance id for a machine
pub fn instance_id(machine_name: &str) -> String {
    digest_hex(machine_name)[..MAX_NAME_LENGTH].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_name_is_stable() {
        let a = security_group_name("prod", "controlplane");
        let b = security_group_name("prod", "controlplane");
        assert_eq!(a, b);
        assert_eq!(a.len(), MAX_NAME_LENGTH);
        assert!(a.starts_with("prod"));
    }

    #[test]
    fn test_group_name_differs_by_role_and_cluster() {
        assert_ne!(
            security_group_name("prod", "controlplane"),
            security_group_name("prod", "node")
        );
        assert_ne!(
            security_group_name("prod", "controlplane"),
            security_group_name("staging", "controlplane")
        );
    }

    #[test]
    fn test_long_cluster_names_do_not_collide() {
        let cluster = "a-very-long-cluster-name-indeed";
        let cp = security_group_name(cluster, "controlplane");
        let node = security_group_name(cluster, "node");
        assert_eq!(cp.len(), MAX_NAME_LENGTH);
        assert_ne!(cp, node);
        assert!(cp.starts_with(&security_group_prefix(cluster)));
        assert_eq!(security_group_prefix(cluster), "averylo");
    }

    #[test]
    fn test_instance_id_is_stable_hex() {
        let id = instance_id("prod-cp-0");
        assert_eq!(id, instance_id("prod-cp-0"));
        assert_ne!(id, instance_id("prod-cp-1"));
        assert_eq!(id.len(), MAX_NAME_LENGTH);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
