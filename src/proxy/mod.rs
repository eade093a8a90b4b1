//! Caller-facing proxy.
//!
//! # Data Flow
//! ```text
//! FailoverProxy::connect(host)
//!     → DriverFactory opens the first underlying connection
//!     → ProxyConnection { ConnectionState, Pipeline [failover, host-monitoring] }
//!     → execute(invocation) → Pipeline → ConnectionState::dispatch → driver
//! ```

pub mod connection;
pub mod factory;

#[cfg(test)]
pub(crate) mod testing;

pub use connection::{ActiveConnection, ConnectionState, FailoverEvent, FailoverPhase, ProxyConnection};
pub use factory::FailoverProxy;
