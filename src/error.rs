//! Error types shared across the proxy.
//!
//! # Propagation
//! ```text
//! ProbeFailure      → swallowed by the host monitor, fed to contexts as "invalid"
//! NodeUnhealthy     → raised by the monitoring interceptor, consumed by failover
//! ConnectionOpen    → recorded per candidate, coordinator moves on
//! FailoverExhausted → surfaced to the caller, wraps the triggering cause
//! FailoverSucceeded → surfaced to the caller, connection now points elsewhere
//! ```

use std::time::Duration;
use thiserror::Error;

/// Errors reported by an underlying driver connection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
    /// Socket-level failure talking to the host.
    #[error("network error: {0}")]
    Network(String),

    /// The driver gave up waiting for the host.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The host rejected the supplied credentials.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The database rejected the operation itself.
    #[error("database error: {0}")]
    Database(String),

    /// The connection was closed or aborted.
    #[error("connection closed")]
    Closed,
}

impl DriverError {
    /// Whether this error means the host itself may be gone.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            DriverError::Network(_) | DriverError::Timeout(_) | DriverError::Closed
        )
    }
}

/// Errors surfaced by the proxy layer.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// A single validation attempt failed or timed out.
    #[error("validation probe against {host} failed: {reason}")]
    ProbeFailure { host: String, reason: String },

    /// The monitoring state machine declared the node unhealthy.
    #[error("node {host} is unhealthy")]
    NodeUnhealthy { host: String },

    /// No candidate host could be reached within the failover budget.
    #[error("failover exhausted after {attempts} connection attempt(s) in {elapsed:?}: {cause}")]
    FailoverExhausted {
        attempts: usize,
        elapsed: Duration,
        #[source]
        cause: Box<ProxyError>,
    },

    /// One candidate could not be reached.
    #[error("could not open connection to {host}: {source}")]
    ConnectionOpenFailure {
        host: String,
        #[source]
        source: DriverError,
    },

    /// Failover completed; the caller should retry against the new host.
    #[error("connection failed over from {from} to {new_host}, retry the operation")]
    FailoverSucceeded { from: String, new_host: String },

    /// Failover completed while a transaction was open.
    #[error("connection failed over to {new_host} inside a transaction, transaction outcome unknown")]
    TransactionResolutionUnknown { new_host: String },

    /// Invalid thresholds or settings, detected at setup time.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The logical connection has been closed by the caller.
    #[error("proxy connection is closed")]
    Closed,

    /// The wrapped driver rejected the operation.
    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl ProxyError {
    /// Whether the failover interceptor should react to this error.
    pub fn triggers_failover(&self) -> bool {
        match self {
            ProxyError::NodeUnhealthy { .. } => true,
            ProxyError::Driver(e) => e.is_network(),
            _ => false,
        }
    }

    /// Whether the caller may reasonably retry the operation.
    pub fn is_retryable_by_caller(&self) -> bool {
        matches!(
            self,
            ProxyError::FailoverExhausted { .. }
                | ProxyError::FailoverSucceeded { .. }
                | ProxyError::TransactionResolutionUnknown { .. }
        )
    }
}

/// Result type for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_failover_classification() {
        assert!(ProxyError::NodeUnhealthy { host: "a".into() }.triggers_failover());
        assert!(ProxyError::Driver(DriverError::Network("reset".into())).triggers_failover());
        assert!(ProxyError::Driver(DriverError::Closed).triggers_failover());
        assert!(!ProxyError::Driver(DriverError::Database("syntax".into())).triggers_failover());
        assert!(!ProxyError::Configuration("bad".into()).triggers_failover());
    }

    #[test]
    fn test_exhausted_keeps_cause() {
        let err = ProxyError::FailoverExhausted {
            attempts: 2,
            elapsed: Duration::from_millis(10),
            cause: Box::new(ProxyError::NodeUnhealthy { host: "db-1:5432".into() }),
        };
        assert!(err.is_retryable_by_caller());
        assert!(err.to_string().contains("db-1:5432"));
        assert!(err.source().is_some());
    }
}
