//! Flat key/value tags stored in a cloud resource's description field.
//!
//! The provider has no native labels on every resource kind, so tags are
//! flattened to `key:value` pairs joined by `,`. Keys and values containing
//! either separator are rejected on encode; parsing stays lenient so that
//! descriptions written by other tools never fail discovery.

use std::collections::BTreeMap;

use crate::{Error, Result};

/// Separator between pairs
pub const PAIR_SEPARATOR: char = ',';
/// Separator between a key and its value
pub const KV_SEPARATOR: char = ':';

/// Tag key holding the owning cluster name
pub const CLUSTER_KEY: &str = "cluster";
/// Tag key holding the resource role
pub const ROLE_KEY: &str = "role";
/// Tag key holding a display name
pub const NAME_KEY: &str = "Name";

/// A flat, unordered key/value mapping
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tag(BTreeMap<String, String>);

impl Tag {
    /// Create an empty tag set
    pub fn new() -> Self {
        Self::default()
    }

    /// Tags identifying a cluster-owned resource, with an optional role and name
    pub fn build(cluster: &str, role: Option<&str>, name: Option<&str>) -> Self {
        let mut tag = Self::new();
        tag.insert(CLUSTER_KEY, cluster);
        if let Some(role) = role {
            tag.insert(ROLE_KEY, role);
        }
        if let Some(name) = name {
            tag.insert(NAME_KEY, name);
        }
        tag
    }

    /// Decode a description string.
    ///
    /// Each pair is split on the first `:`; a pair without one maps the
    /// whole text to an empty value. Empty input yields an empty tag.
    pub fn parse(s: &str) -> Self {
        let map = s
            .split(PAIR_SEPARATOR)
            .filter(|part| !part.is_empty())
            .map(|part| match part.split_once(KV_SEPARATOR) {
                Some((k, v)) => (k.to_string(), v.to_string()),
                None => (part.to_string(), String::new()),
            })
            .collect();
        Self(map)
    }

    /// Encode to a description string, rejecting reserved separators
    pub fn encode(&self) -> Result<String> {
        for (k, v) in &self.0 {
            for (what, text) in [("key", k), ("value", v)] {
                if text.contains(PAIR_SEPARATOR) || text.contains(KV_SEPARATOR) {
                    return Err(Error::validation_for_field(
                        "tag",
                        k.as_str(),
                        format!(
                            "{} {:?} contains a reserved separator ('{}' or '{}')",
                            what, text, PAIR_SEPARATOR, KV_SEPARATOR
                        ),
                    ));
                }
            }
        }

        Ok(self
            .0
            .iter()
            .map(|(k, v)| format!("{}{}{}", k, KV_SEPARATOR, v))
            .collect::<Vec<_>>()
            .join(&PAIR_SEPARATOR.to_string()))
    }

    /// Set a tag value, replacing any previous one
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Look up a tag value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Check that every pair in `other` is present with the same value
    pub fn contains_all(&self, other: &Tag) -> bool {
        other.0.iter().all(|(k, v)| self.get(k) == Some(v.as_str()))
    }

    /// Number of pairs
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the tag set is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Tag {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
