//! Resilience helpers shared by failover.

pub mod backoff;
