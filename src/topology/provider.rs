//! Host list providers.

use async_trait::async_trait;

use crate::config::schema::ClusterConfig;
use crate::error::{ProxyError, ProxyResult};
use crate::topology::host::{HostRole, HostSpec};

/// Supplies cluster membership and roles.
#[async_trait]
pub trait HostListProvider: Send + Sync {
    /// Return the hosts that could replace `current`, hosts with `role` first.
    async fn candidate_hosts(&self, current: &HostSpec, role: HostRole) -> ProxyResult<Vec<HostSpec>>;
}

/// Fixed topology taken from configuration.
#[derive(Debug, Clone)]
pub struct StaticHostListProvider {
    hosts: Vec<HostSpec>,
}

impl StaticHostListProvider {
    pub fn new(hosts: Vec<HostSpec>) -> Self {
        Self { hosts }
    }

    pub fn from_config(config: &ClusterConfig) -> ProxyResult<Self> {
        if config.hosts.is_empty() {
            return Err(ProxyError::Configuration("cluster has no hosts".into()));
        }
        Ok(Self::new(config.hosts.clone()))
    }

    pub fn hosts(&self) -> &[HostSpec] {
        &self.hosts
    }

    /// First host with the writer role.
    pub fn writer(&self) -> Option<&HostSpec> {
        self.hosts.iter().find(|h| h.role == HostRole::Writer)
    }
}

#[async_trait]
impl HostListProvider for StaticHostListProvider {
    async fn candidate_hosts(&self, current: &HostSpec, role: HostRole) -> ProxyResult<Vec<HostSpec>> {
        let (mut preferred, others): (Vec<HostSpec>, Vec<HostSpec>) = self
            .hosts
            .iter()
            .filter(|h| !h.same_node(current))
            .cloned()
            .partition(|h| h.role == role);
        preferred.extend(others);
        Ok(preferred)
    }
}
