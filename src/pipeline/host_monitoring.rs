//! Host monitoring interceptor.
//!
//! Arms a [`MonitorConnectionContext`] around every network-bound call so a
//! call blocked on a dead node is released once the node's monitor reaches an
//! unhealthy verdict, instead of waiting for the driver's own timeout.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::config::MonitorSettings;
use crate::error::{ProxyError, ProxyResult};
use crate::monitoring::{MonitorConnectionContext, MonitorService};
use crate::pipeline::chain::{Interceptor, Next};
use crate::pipeline::invocation::Invocation;

pub const HOST_MONITORING: &str = "host-monitoring";

pub struct HostMonitoringInterceptor {
    service: Arc<MonitorService>,
    settings: MonitorSettings,
}

impl HostMonitoringInterceptor {
    pub fn new(service: Arc<MonitorService>, settings: MonitorSettings) -> Self {
        Self { service, settings }
    }
}

#[async_trait]
impl Interceptor for HostMonitoringInterceptor {
    fn name(&self) -> &str {
        HOST_MONITORING
    }

    async fn intercept(&self, invocation: Invocation, next: Next<'_>) -> ProxyResult<Value> {
        if !invocation.is_network_bound() {
            return next.run(invocation).await;
        }

        let active = next.connection().current();
        let context: Arc<MonitorConnectionContext> = self.service.start_monitoring(
            &active.host,
            Some(active.connection.clone()),
            &self.settings,
        );

        let outcome = tokio::select! {
            result = next.run(invocation) => Some(result),
            _ = context.wait_unhealthy() => None,
        };
        self.service.stop_monitoring(&active.host.host_key(), &context);

        match outcome {
            Some(Ok(value)) => Ok(value),
            Some(Err(err)) if context.is_node_unhealthy() && err.triggers_failover() => {
                Err(ProxyError::NodeUnhealthy {
                    host: active.host.host_key(),
                })
            }
            Some(Err(err)) => Err(err),
            None => {
                active.connection.abort();
                tracing::warn!(
                    connection = %next.connection().id(),
                    host = %active.host,
                    failures = context.failure_count(),
                    "Call abandoned, node unhealthy"
                );
                Err(ProxyError::NodeUnhealthy {
                    host: active.host.host_key(),
                })
            }
        }
    }
}
