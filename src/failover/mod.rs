//! Failover subsystem.
//!
//! # Data Flow
//! ```text
//! FailoverInterceptor (pipeline)
//!     → coordinator.rs (one failover per logical connection at a time)
//!     → HostListProvider (candidates) → FailoverMode + selector.rs (ordering)
//!     → DriverFactory (per-candidate connect, bounded)
//!     → ConnectionState swapped to the new host
//! ```

pub mod coordinator;
pub mod selector;

use serde::{Deserialize, Serialize};

use crate::topology::{HostRole, HostSpec};
use selector::HostSelector;

pub use coordinator::FailoverCoordinator;
pub use selector::ReaderSelection;

/// Which roles may replace a failed host, and in what order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailoverMode {
    /// Only writers are acceptable.
    #[default]
    StrictWriter,
    /// Readers first, writers as a last resort.
    StrictReader,
    /// Any host, in selector order regardless of role.
    ReaderOrWriter,
}

impl FailoverMode {
    /// Role requested from the topology provider.
    pub fn preferred_role(self) -> HostRole {
        match self {
            FailoverMode::StrictWriter => HostRole::Writer,
            FailoverMode::StrictReader | FailoverMode::ReaderOrWriter => HostRole::Reader,
        }
    }

    /// Filter and order `candidates` for one connection pass.
    pub fn arrange(self, candidates: Vec<HostSpec>, selector: &HostSelector) -> Vec<HostSpec> {
        match self {
            FailoverMode::StrictWriter => candidates
                .into_iter()
                .filter(|h| h.role == HostRole::Writer)
                .collect(),
            FailoverMode::StrictReader => {
                let (readers, writers): (Vec<_>, Vec<_>) =
                    candidates.into_iter().partition(|h| h.role == HostRole::Reader);
                let mut ordered = selector.order(readers);
                ordered.extend(writers);
                ordered
            }
            FailoverMode::ReaderOrWriter => selector.order(candidates),
        }
    }
}
