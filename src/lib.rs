//! Failover-aware database connection proxy.
//!
//! Wraps driver connections in an interceptor pipeline that monitors node
//! health in the background and moves logical connections to another host
//! when the current one is declared unhealthy.

pub mod config;
pub mod driver;
pub mod error;
pub mod failover;
pub mod monitoring;
pub mod observability;
pub mod pipeline;
pub mod proxy;
pub mod resilience;
pub mod topology;

pub use config::schema::ProxyConfig;
pub use error::{DriverError, ProxyError, ProxyResult};
pub use pipeline::{Interceptor, Invocation, Pipeline};
pub use proxy::{FailoverProxy, ProxyConnection};
pub use topology::{HostListProvider, HostRole, HostSpec};
