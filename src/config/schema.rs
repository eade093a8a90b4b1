//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::failover::selector::ReaderSelection;
use crate::failover::FailoverMode;
use crate::topology::HostSpec;

/// Root configuration for the failover proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Host health monitoring thresholds.
    pub monitoring: MonitoringConfig,

    /// Failover behaviour.
    pub failover: FailoverConfig,

    /// Cluster members (static topology).
    pub cluster: ClusterConfig,

    /// Credentials used when (re)connecting.
    pub credentials: CredentialsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Failure detection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Enable host monitoring around network-bound calls.
    pub enabled: bool,

    /// Grace period after arming a context before failures count.
    pub failure_detection_time_ms: u64,

    /// Expected spacing between validation probes.
    pub failure_detection_interval_ms: u64,

    /// Consecutive failures required; 0 disables the unhealthy verdict.
    pub failure_detection_count: u32,

    /// How long a host monitor idles without contexts before it is disposed.
    pub monitor_disposal_time_ms: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_detection_time_ms: 30_000,
            failure_detection_interval_ms: 5_000,
            failure_detection_count: 3,
            monitor_disposal_time_ms: 60_000,
        }
    }
}

impl MonitoringConfig {
    pub fn settings(&self) -> MonitorSettings {
        MonitorSettings {
            failure_detection_time: Duration::from_millis(self.failure_detection_time_ms),
            failure_detection_interval: Duration::from_millis(self.failure_detection_interval_ms),
            failure_detection_count: self.failure_detection_count,
            monitor_disposal_time: Duration::from_millis(self.monitor_disposal_time_ms),
        }
    }
}

/// Runtime form of [`MonitoringConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    pub failure_detection_time: Duration,
    pub failure_detection_interval: Duration,
    pub failure_detection_count: u32,
    pub monitor_disposal_time: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        MonitoringConfig::default().settings()
    }
}

/// Failover configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FailoverConfig {
    /// Enable the failover interceptor.
    pub enabled: bool,

    /// Which roles may replace a failed host, and in what order.
    pub mode: FailoverMode,

    /// How readers are ordered among themselves.
    pub reader_selection: ReaderSelection,

    /// Overall budget for one failover.
    pub timeout_ms: u64,

    /// Budget for a single candidate connection attempt.
    pub connect_timeout_ms: u64,

    /// Passes over the candidate list before giving up (still bounded by `timeout_ms`).
    pub max_rounds: u32,

    /// Base delay for exponential backoff between passes.
    pub round_backoff_base_ms: u64,

    /// Maximum delay between passes.
    pub round_backoff_max_ms: u64,

    /// Replay idempotent operations once against the new host.
    pub retry_idempotent: bool,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: FailoverMode::StrictWriter,
            reader_selection: ReaderSelection::RoundRobin,
            timeout_ms: 300_000,
            connect_timeout_ms: 30_000,
            max_rounds: 3,
            round_backoff_base_ms: 100,
            round_backoff_max_ms: 2_000,
            retry_idempotent: false,
        }
    }
}

impl FailoverConfig {
    pub fn settings(&self) -> FailoverSettings {
        FailoverSettings {
            mode: self.mode,
            reader_selection: self.reader_selection,
            timeout: Duration::from_millis(self.timeout_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            max_rounds: self.max_rounds,
            round_backoff_base_ms: self.round_backoff_base_ms,
            round_backoff_max_ms: self.round_backoff_max_ms,
            retry_idempotent: self.retry_idempotent,
        }
    }
}

/// Runtime form of [`FailoverConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailoverSettings {
    pub mode: FailoverMode,
    pub reader_selection: ReaderSelection,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub max_rounds: u32,
    pub round_backoff_base_ms: u64,
    pub round_backoff_max_ms: u64,
    pub retry_idempotent: bool,
}

impl Default for FailoverSettings {
    fn default() -> Self {
        FailoverConfig::default().settings()
    }
}

/// Static cluster membership.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClusterConfig {
    pub hosts: Vec<HostSpec>,
}

/// Connection credentials.
#[derive(Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CredentialsConfig {
    pub username: String,

    /// Literal password. Prefer `password_env`.
    pub password: Option<String>,

    /// Environment variable read at every (re)connect.
    pub password_env: Option<String>,
}

impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("password_env", &self.password_env)
            .finish()
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
