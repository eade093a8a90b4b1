//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize, environment overrides)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → MonitorSettings / FailoverSettings handed to the proxy
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; thresholds never change under a live context
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::ProxyConfig;
pub use schema::{ClusterConfig, CredentialsConfig, FailoverConfig, MonitoringConfig};
pub use schema::{FailoverSettings, MonitorSettings};
