//! Per-connection failure detection state machine.
//!
//! # States
//! - Healthy: `failure_count == 0`
//! - SuspectRun: failures observed, detection window not yet exceeded
//! - Unhealthy: verdict reached, sticky until a successful probe
//!
//! # State Transitions
//! ```text
//! any       → Healthy:    probe succeeds (count and run start cleared)
//! Healthy   → SuspectRun: probe fails (run start recorded)
//! SuspectRun→ Unhealthy:  end - run_start >= interval * count
//!                         and failure_count >= count
//! ```
//!
//! # Design Decisions
//! - Elapsed time is authoritative, the raw count only gates it, so late or
//!   delayed probes cannot shorten detection
//! - The grace window (`failure_detection_time`) is measured from arming and
//!   only delays the first delivered result; it does not consume the window
//! - `failure_detection_count == 0` disables the verdict entirely

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::config::MonitorSettings;
use crate::driver::DbConnection;
use crate::monitoring::monitor::HostMonitor;
use crate::observability::metrics;

/// Probe result as published by a host monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeReport {
    pub started: Instant,
    pub finished: Instant,
    pub valid: bool,
}

#[derive(Debug, Default)]
struct DetectionState {
    failure_count: u32,
    invalid_node_start_time: Option<Instant>,
    is_valid: bool,
    node_unhealthy: bool,
    last_report: Option<ProbeReport>,
}

/// Health tracking for one logical operation against one node.
#[derive(Debug)]
pub struct MonitorConnectionContext {
    node_keys: BTreeSet<String>,
    connection: Option<Arc<dyn DbConnection>>,
    failure_detection_time: Duration,
    failure_detection_interval: Duration,
    failure_detection_count: u32,
    start_monitor_time: Instant,
    active: AtomicBool,
    reports_seen: AtomicU64,
    state: Mutex<DetectionState>,
    unhealthy_tx: watch::Sender<bool>,
    monitor: Mutex<Weak<HostMonitor>>,
}

impl MonitorConnectionContext {
    pub fn new(
        node_keys: BTreeSet<String>,
        connection: Option<Arc<dyn DbConnection>>,
        settings: &MonitorSettings,
    ) -> Self {
        let (unhealthy_tx, _) = watch::channel(false);
        Self {
            node_keys,
            connection,
            failure_detection_time: settings.failure_detection_time,
            failure_detection_interval: settings.failure_detection_interval,
            failure_detection_count: settings.failure_detection_count,
            start_monitor_time: Instant::now(),
            active: AtomicBool::new(true),
            reports_seen: AtomicU64::new(0),
            state: Mutex::new(DetectionState {
                is_valid: true,
                ..DetectionState::default()
            }),
            unhealthy_tx,
            monitor: Mutex::new(Weak::new()),
        }
    }

    pub fn node_keys(&self) -> &BTreeSet<String> {
        &self.node_keys
    }

    pub fn failure_detection_interval(&self) -> Duration {
        self.failure_detection_interval
    }

    /// Upper bound of the detection window: `interval * count`.
    pub fn max_invalid_node_duration(&self) -> Duration {
        self.failure_detection_interval
            .saturating_mul(self.failure_detection_count)
    }

    /// Deliver a probe result from the host monitor.
    ///
    /// Every delivery is recorded; the state machine only sees it when the
    /// context is still active and the grace window has passed.
    pub fn update_connection_status(&self, started: Instant, finished: Instant, valid: bool) {
        self.reports_seen.fetch_add(1, Ordering::Relaxed);
        self.state.lock().last_report = Some(ProbeReport { started, finished, valid });

        if !self.is_active() {
            return;
        }
        let elapsed = finished.saturating_duration_since(self.start_monitor_time);
        if elapsed > self.failure_detection_time {
            self.set_connection_valid(valid, started, finished);
        }
    }

    /// Feed one probe outcome into the state machine.
    pub fn set_connection_valid(&self, valid: bool, started: Instant, finished: Instant) {
        let mut state = self.state.lock();
        state.is_valid = valid;

        if valid {
            state.failure_count = 0;
            state.invalid_node_start_time = None;
            state.node_unhealthy = false;
            self.unhealthy_tx.send_replace(false);
            return;
        }

        state.failure_count = state.failure_count.saturating_add(1);
        let run_start = *state.invalid_node_start_time.get_or_insert(started);

        if self.failure_detection_count == 0 {
            tracing::trace!(
                node = ?self.node_keys,
                failure_count = state.failure_count,
                "Node not responding, unhealthy verdict disabled"
            );
            return;
        }

        let invalid_duration = finished.saturating_duration_since(run_start);
        if invalid_duration >= self.max_invalid_node_duration()
            && state.failure_count >= self.failure_detection_count
        {
            if !state.node_unhealthy {
                state.node_unhealthy = true;
                drop(state);
                self.on_unhealthy(invalid_duration);
            }
            return;
        }

        tracing::trace!(
            node = ?self.node_keys,
            failure_count = state.failure_count,
            "Node not responding"
        );
    }

    fn on_unhealthy(&self, invalid_duration: Duration) {
        tracing::warn!(
            node = ?self.node_keys,
            invalid_ms = invalid_duration.as_millis() as u64,
            "Node declared unhealthy"
        );
        metrics::record_node_unhealthy(self.primary_key());
        if let Some(connection) = &self.connection {
            connection.abort();
        }
        self.unhealthy_tx.send_replace(true);
    }

    fn primary_key(&self) -> &str {
        self.node_keys.iter().next().map(String::as_str).unwrap_or("unknown")
    }

    pub fn is_node_unhealthy(&self) -> bool {
        self.state.lock().node_unhealthy
    }

    /// Resolves once the node is declared unhealthy.
    pub async fn wait_unhealthy(&self) {
        let mut rx = self.unhealthy_tx.subscribe();
        let _ = rx.wait_for(|unhealthy| *unhealthy).await;
    }

    pub fn failure_count(&self) -> u32 {
        self.state.lock().failure_count
    }

    pub fn is_invalid_node_start_time_defined(&self) -> bool {
        self.state.lock().invalid_node_start_time.is_some()
    }

    /// Last probe outcome fed to the state machine.
    pub fn is_valid(&self) -> bool {
        self.state.lock().is_valid
    }

    pub fn last_report(&self) -> Option<ProbeReport> {
        self.state.lock().last_report
    }

    /// Number of probe rounds delivered to this context.
    pub fn reports_seen(&self) -> u64 {
        self.reports_seen.load(Ordering::Relaxed)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Remember the monitor that accepted this context.
    pub(crate) fn bind_monitor(&self, monitor: &Arc<HostMonitor>) {
        *self.monitor.lock() = Arc::downgrade(monitor);
    }

    /// The monitor this context is registered with, while it is alive.
    pub(crate) fn bound_monitor(&self) -> Option<Arc<HostMonitor>> {
        self.monitor.lock().upgrade()
    }

    /// Called on deregistration; later deliveries become no-ops.
    pub fn invalidate(&self) {
        self.active.store(false, Ordering::Release);
    }

    #[cfg(test)]
    pub(crate) fn set_failure_count(&self, count: u32) {
        self.state.lock().failure_count = count;
    }

    #[cfg(test)]
    pub(crate) fn reset_invalid_node_start_time(&self) {
        self.state.lock().invalid_node_start_time = None;
    }
}
