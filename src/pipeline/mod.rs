//! Operation interception pipeline.
//!
//! # Data Flow
//! ```text
//! ProxyConnection::execute(invocation)
//!     → chain.rs (ordered interceptors, each wrapping the rest)
//!         → failover.rs (catch node loss, fail over, translate)
//!         → host_monitoring.rs (arm context, race call against verdict)
//!     → ConnectionState::dispatch (driver call)
//! ```

pub mod chain;
pub mod failover;
pub mod host_monitoring;
pub mod invocation;

pub use chain::{Interceptor, Next, Pipeline};
pub use failover::FailoverInterceptor;
pub use host_monitoring::HostMonitoringInterceptor;
pub use invocation::Invocation;
