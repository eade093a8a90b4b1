//! Failover interceptor.
//!
//! Catches errors that indicate the node is gone, hands the logical
//! connection to the [`FailoverCoordinator`] and translates the outcome for
//! the caller.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::error::{ProxyError, ProxyResult};
use crate::failover::FailoverCoordinator;
use crate::pipeline::chain::{Interceptor, Next};
use crate::pipeline::invocation::Invocation;

pub const FAILOVER: &str = "failover";

pub struct FailoverInterceptor {
    coordinator: Arc<FailoverCoordinator>,
    retry_idempotent: bool,
}

impl FailoverInterceptor {
    pub fn new(coordinator: Arc<FailoverCoordinator>) -> Self {
        let retry_idempotent = coordinator.settings().retry_idempotent;
        Self {
            coordinator,
            retry_idempotent,
        }
    }
}

#[async_trait]
impl Interceptor for FailoverInterceptor {
    fn name(&self) -> &str {
        FAILOVER
    }

    async fn intercept(&self, invocation: Invocation, next: Next<'_>) -> ProxyResult<Value> {
        if !invocation.is_network_bound() {
            return next.run(invocation).await;
        }

        let state = next.connection();
        let active = state.current();
        let in_transaction = state.in_transaction();
        let replay = (self.retry_idempotent && invocation.is_idempotent() && !in_transaction)
            .then(|| invocation.clone());

        let cause = match next.run(invocation).await {
            Err(err) if err.triggers_failover() => err,
            other => return other,
        };

        let event = self.coordinator.failover(state, &active, cause).await?;

        if in_transaction {
            return Err(ProxyError::TransactionResolutionUnknown {
                new_host: event.to.host_key(),
            });
        }
        if let Some(invocation) = replay {
            tracing::info!(
                connection = %state.id(),
                host = %event.to,
                method = invocation.method(),
                "Replaying idempotent operation after failover"
            );
            return next.run(invocation).await;
        }
        Err(ProxyError::FailoverSucceeded {
            from: event.from.host_key(),
            new_host: event.to.host_key(),
        })
    }
}
