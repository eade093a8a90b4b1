//! Driver seam: the wire-protocol connections the proxy wraps.
//!
//! # Data Flow
//! ```text
//! FailoverProxy::connect / FailoverCoordinator
//!     → credentials.rs (fetch username + secret)
//!     → DriverFactory::open_connection
//!     → Arc<dyn DbConnection> installed in the logical connection
//! ```
//!
//! # Design Decisions
//! - The proxy never speaks a database protocol; drivers are trait objects
//! - `abort` is synchronous so it can be called from the monitor task
//! - Drivers must honour the timeouts they are handed

pub mod credentials;
pub mod tcp;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::error::DriverError;
use crate::pipeline::Invocation;
use crate::topology::HostSpec;

pub use credentials::{Credentials, CredentialsProvider, EnvCredentials, StaticCredentials};

/// A live driver-level connection to one host.
#[async_trait]
pub trait DbConnection: Send + Sync + std::fmt::Debug {
    /// Perform the real operation.
    async fn call(&self, invocation: &Invocation) -> Result<Value, DriverError>;

    /// Liveness check; must return within `timeout`.
    async fn is_valid(&self, timeout: Duration) -> bool;

    /// Close gracefully.
    async fn close(&self);

    /// Tear the connection down immediately, failing any in-flight call.
    fn abort(&self);

    fn is_closed(&self) -> bool;
}

/// Opens driver connections.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn open_connection(
        &self,
        host: &HostSpec,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<Arc<dyn DbConnection>, DriverError>;
}
