//! Host descriptors.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Role of a cluster member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostRole {
    Writer,
    Reader,
}

impl fmt::Display for HostRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostRole::Writer => write!(f, "writer"),
            HostRole::Reader => write!(f, "reader"),
        }
    }
}

/// One database endpoint, possibly reachable under several aliases.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostSpec {
    pub host: String,
    pub port: u16,
    pub role: HostRole,
    #[serde(default)]
    pub aliases: BTreeSet<String>,
}

impl HostSpec {
    pub fn new(host: impl Into<String>, port: u16, role: HostRole) -> Self {
        Self {
            host: host.into(),
            port,
            role,
            aliases: BTreeSet::new(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.insert(alias.into());
        self
    }

    /// Canonical `host:port` key.
    pub fn host_key(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// All keys this node answers to, including the canonical one.
    pub fn node_keys(&self) -> BTreeSet<String> {
        let mut keys = self.aliases.clone();
        keys.insert(self.host_key());
        keys
    }

    /// True when both descriptors name the same physical node.
    pub fn same_node(&self, other: &HostSpec) -> bool {
        let ours = self.node_keys();
        other.node_keys().iter().any(|k| ours.contains(k))
    }
}

impl fmt::Display for HostSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_keys_include_aliases() {
        let host = HostSpec::new("db-1", 5432, HostRole::Writer).with_alias("10.0.0.5:5432");
        let keys = host.node_keys();
        assert!(keys.contains("db-1:5432"));
        assert!(keys.contains("10.0.0.5:5432"));

        let alias_only = HostSpec::new("10.0.0.5", 5432, HostRole::Writer);
        assert!(host.same_node(&alias_only));
        assert!(!host.same_node(&HostSpec::new("db-2", 5432, HostRole::Reader)));
    }
}
