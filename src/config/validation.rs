//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals and timeouts > 0)
//! - Check cluster membership is usable for failover
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::topology::HostRole;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let monitoring = &config.monitoring;
    if monitoring.failure_detection_interval_ms == 0 {
        errors.push(ValidationError::new(
            "monitoring.failure_detection_interval_ms",
            "must be greater than zero",
        ));
    }
    if monitoring.monitor_disposal_time_ms == 0 {
        errors.push(ValidationError::new(
            "monitoring.monitor_disposal_time_ms",
            "must be greater than zero",
        ));
    }

    let failover = &config.failover;
    if failover.timeout_ms == 0 {
        errors.push(ValidationError::new("failover.timeout_ms", "must be greater than zero"));
    }
    if failover.connect_timeout_ms == 0 {
        errors.push(ValidationError::new("failover.connect_timeout_ms", "must be greater than zero"));
    } else if failover.connect_timeout_ms > failover.timeout_ms {
        errors.push(ValidationError::new(
            "failover.connect_timeout_ms",
            "must not exceed failover.timeout_ms",
        ));
    }
    if failover.max_rounds == 0 {
        errors.push(ValidationError::new("failover.max_rounds", "must be at least 1"));
    }
    if failover.round_backoff_base_ms > failover.round_backoff_max_ms {
        errors.push(ValidationError::new(
            "failover.round_backoff_base_ms",
            "must not exceed failover.round_backoff_max_ms",
        ));
    }

    let mut seen = HashSet::new();
    for (i, host) in config.cluster.hosts.iter().enumerate() {
        if host.host.trim().is_empty() {
            errors.push(ValidationError::new(format!("cluster.hosts[{}].host", i), "must not be empty"));
        }
        if host.port == 0 {
            errors.push(ValidationError::new(format!("cluster.hosts[{}].port", i), "must not be zero"));
        }
        if !seen.insert(host.host_key()) {
            errors.push(ValidationError::new(
                format!("cluster.hosts[{}]", i),
                format!("duplicate host {}", host.host_key()),
            ));
        }
    }
    if !config.cluster.hosts.is_empty()
        && !config.cluster.hosts.iter().any(|h| h.role == HostRole::Writer)
    {
        errors.push(ValidationError::new("cluster.hosts", "no host has the writer role"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
