//! Engine configuration
//!
//! Everything the engine would otherwise read from the process environment
//! is passed in explicitly through [`EngineConfig`].

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::Backoff;
use crate::{Error, Result};

/// Secret key holding the access key ID
pub const ACCESS_KEY_ID_KEY: &str = "STRATUS_ACCESS_KEY_ID";
/// Secret key holding the secret access key
pub const SECRET_ACCESS_KEY_KEY: &str = "STRATUS_SECRET_ACCESS_KEY";
/// Secret key holding the region
pub const REGION_KEY: &str = "STRATUS_REGION";

/// Default provider ID scheme
pub const DEFAULT_PROVIDER_NAME: &str = "stratus";
/// SSH key used when a machine does not name one
pub const DEFAULT_SSH_KEY_NAME: &str = "default";

/// Cloud API credentials, consumed by the transport
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Region the account operates in
    pub region: String,
}

impl Credentials {
    /// Load credentials from a K8s secret's string data
    pub fn from_secret(secret: &HashMap<String, String>) -> Option<Self> {
        Some(Self {
            access_key_id: secret.get(ACCESS_KEY_ID_KEY)?.clone(),
            secret_access_key: secret.get(SECRET_ACCESS_KEY_KEY)?.clone(),
            region: secret.get(REGION_KEY)?.clone(),
        })
    }
}

/// Default image lookup filter
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSelector {
    /// Image name filter (empty matches any name)
    #[serde(default)]
    pub name: String,
    /// Image owner filter
    pub owner: String,
}

impl Default for ImageSelector {
    fn default() -> Self {
        Self {
            name: String::new(),
            owner: "niftycloud".to_string(),
        }
    }
}

/// Bootstrap payload hand-off settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapConfig {
    /// Port of the file-transfer service on the instance
    pub port: u16,
    /// Destination path of the payload on the instance
    pub destination: String,
    /// File mode of the written payload
    pub mode: String,
    /// Pause between the instance reporting ready and the transfer
    #[serde(with = "duration_ms", rename = "settleDelayMs")]
    pub settle_delay: Duration,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            port: 22,
            destination: "/root/bootstrap.cfg".to_string(),
            mode: "0655".to_string(),
            settle_delay: Duration::from_secs(3),
        }
    }
}

/// Configuration passed into the engine at construction time
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Cloud API credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
    /// The operator's public address, the source of every managed ingress rule
    pub operator_address: IpAddr,
    /// Scheme used for provider IDs (`<provider>:////<uid>`)
    #[serde(default = "default_provider_name")]
    pub provider_name: String,
    /// SSH key used when a machine does not name one
    #[serde(default = "default_ssh_key_name")]
    pub default_ssh_key_name: String,
    /// Image lookup filter used when a machine does not name an image
    #[serde(default)]
    pub default_image: ImageSelector,
    /// Backoff schedule for retried mutations and instance waits
    #[serde(default)]
    pub backoff: Backoff,
    /// Bootstrap hand-off settings
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

fn default_provider_name() -> String {
    DEFAULT_PROVIDER_NAME.to_string()
}

fn default_ssh_key_name() -> String {
    DEFAULT_SSH_KEY_NAME.to_string()
}

impl EngineConfig {
    /// Create a configuration with defaults for everything but the operator address
    pub fn new(operator_address: IpAddr) -> Self {
        Self {
            credentials: None,
            operator_address,
            provider_name: default_provider_name(),
            default_ssh_key_name: default_ssh_key_name(),
            default_image: ImageSelector::default(),
            backoff: Backoff::default(),
            bootstrap: BootstrapConfig::default(),
        }
    }

    /// Parse and validate a YAML configuration document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| {
            Error::validation_for("engine config", format!("invalid YAML: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check values serde cannot constrain
    pub fn validate(&self) -> Result<()> {
        if self.provider_name.is_empty() {
            return Err(Error::validation_for_field(
                "engine config",
                "providerName",
                "must not be empty",
            ));
        }
        if self.default_ssh_key_name.is_empty() {
            return Err(Error::validation_for_field(
                "engine config",
                "defaultSshKeyName",
                "must not be empty",
            ));
        }
        if self.backoff.factor < 1.0 {
            return Err(Error::validation_for_field(
                "engine config",
                "backoff.factor",
                format!("must be at least 1.0, got {}", self.backoff.factor),
            ));
        }
        if !(0.0..=1.0).contains(&self.backoff.jitter) {
            return Err(Error::validation_for_field(
                "engine config",
                "backoff.jitter",
                format!("must be within 0.0..=1.0, got {}", self.backoff.jitter),
            ));
        }
        if self.backoff.steps == 0 {
            return Err(Error::validation_for_field(
                "engine config",
                "backoff.steps",
                "must be at least 1",
            ));
        }
        if !self.bootstrap.destination.starts_with('/') {
            return Err(Error::validation_for_field(
                "engine config",
                "bootstrap.destination",
                "must be an absolute path",
            ));
        }
        Ok(())
    }
}

/// Serde adapter storing a [`Duration`] as whole milliseconds
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize as milliseconds
    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    /// Deserialize from milliseconds
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
