//! Host health monitoring subsystem.
//!
//! # Data Flow
//! ```text
//! Monitoring interceptor arms a context (context.rs)
//!     → service.rs finds or creates the host's monitor
//!     → monitor.rs probes the host every interval (probe.rs)
//!     → each result is published to all registered contexts
//!     → context.rs decides Healthy / SuspectRun / Unhealthy
//! Interceptor deregisters the context when the call ends
//!     → idle monitors dispose themselves after the disposal window
//! ```
//!
//! # Design Decisions
//! - One monitor per physical node shared by all logical connections
//! - Contexts only change through `update_connection_status` / `set_connection_valid`
//! - A round publishes to the contexts registered when it started

pub mod context;
pub mod monitor;
pub mod probe;
pub mod service;

pub use context::{MonitorConnectionContext, ProbeReport};
pub use monitor::HostMonitor;
pub use probe::{DriverProbe, DriverProbeFactory, ProbeFactory, ValidationProbe};
pub use service::MonitorService;
