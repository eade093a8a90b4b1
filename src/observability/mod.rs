//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! monitoring / failover
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout subscriber
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Metric calls are no-ops until a recorder is installed
//! - Host labels use the canonical `host:port` key

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::init_metrics;
