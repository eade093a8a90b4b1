//! Interceptor chain.
//!
//! Each interceptor receives the invocation plus a [`Next`] handle for the
//! rest of the chain. It may rewrite the invocation, call `next.run` zero or
//! more times, and translate whatever comes back. The end of the chain is the
//! real call on the logical connection's current driver connection.

use arc_swap::ArcSwap;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::error::ProxyResult;
use crate::pipeline::invocation::Invocation;
use crate::proxy::ConnectionState;

/// A wrapper around every intercepted call.
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Stable name used to deregister the interceptor.
    fn name(&self) -> &str;

    async fn intercept(&self, invocation: Invocation, next: Next<'_>) -> ProxyResult<Value>;
}

/// The remainder of the chain after the current interceptor.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    rest: &'a [Arc<dyn Interceptor>],
    connection: &'a Arc<ConnectionState>,
}

impl<'a> Next<'a> {
    /// Logical connection the call is running on.
    pub fn connection(&self) -> &'a Arc<ConnectionState> {
        self.connection
    }

    /// Delegate to the next interceptor, or to the driver at the end.
    pub async fn run(self, invocation: Invocation) -> ProxyResult<Value> {
        match self.rest.split_first() {
            Some((head, rest)) => {
                let next = Next {
                    rest,
                    connection: self.connection,
                };
                head.intercept(invocation, next).await
            }
            None => self.connection.dispatch(&invocation).await,
        }
    }
}

/// Ordered, caller-configured interceptor list.
///
/// Invocations take a snapshot of the list, so registration changes only
/// affect calls that start afterwards.
pub struct Pipeline {
    interceptors: ArcSwap<Vec<Arc<dyn Interceptor>>>,
}

impl Pipeline {
    pub fn new(interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        Self {
            interceptors: ArcSwap::from_pointee(interceptors),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Append at the innermost position (closest to the driver).
    pub fn push(&self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(interceptor.clone());
            next
        });
    }

    /// Insert at `index`; 0 is outermost.
    pub fn insert(&self, index: usize, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.rcu(|current| {
            let mut next = Vec::clone(current);
            next.insert(index.min(next.len()), interceptor.clone());
            next
        });
    }

    /// Remove every interceptor registered under `name`.
    pub fn remove(&self, name: &str) -> bool {
        let previous = self.interceptors.rcu(|current| {
            current
                .iter()
                .filter(|i| i.name() != name)
                .cloned()
                .collect::<Vec<_>>()
        });
        previous.iter().any(|i| i.name() == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.interceptors
            .load()
            .iter()
            .map(|i| i.name().to_string())
            .collect()
    }

    pub async fn invoke(&self, connection: &Arc<ConnectionState>, invocation: Invocation) -> ProxyResult<Value> {
        let chain = self.interceptors.load_full();
        let next = Next {
            rest: chain.as_slice(),
            connection,
        };
        next.run(invocation).await
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline").field("interceptors", &self.names()).finish()
    }
}
