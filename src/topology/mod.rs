//! Cluster topology seam.
//!
//! # Data Flow
//! ```text
//! Failover triggered
//!     → provider.rs (ask for candidate hosts for a role)
//!     → failover::selector orders readers/writers
//!     → coordinator tries candidates in order
//! ```
//!
//! The proxy never discovers topology itself; it only consumes a
//! [`HostListProvider`].

pub mod host;
pub mod provider;

pub use host::{HostRole, HostSpec};
pub use provider::{HostListProvider, StaticHostListProvider};
