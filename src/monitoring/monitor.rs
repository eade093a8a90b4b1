//! Per-host probing task.
//!
//! # Responsibilities
//! - Probe one host on a fixed interval with a bounded timeout
//! - Publish every result to all contexts registered by the time it is
//!   published, including those deregistered while the probe ran
//! - Dispose itself once no context has been registered for the idle window
//!
//! # Design Decisions
//! - One task per host, regardless of how many connections use it
//! - Registration and disposal share one lock: a registration either lands
//!   before disposal (disposal aborted) or observes `stopped` and the service
//!   builds a replacement
//! - Sleeps are `select!`ed against the shutdown signal

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::config::MonitorSettings;
use crate::monitoring::context::{MonitorConnectionContext, ProbeReport};
use crate::monitoring::probe::ValidationProbe;
use crate::observability::metrics;
use crate::topology::HostSpec;

#[derive(Default)]
struct Registry {
    contexts: Vec<Arc<MonitorConnectionContext>>,
    idle_since: Option<Instant>,
    stopped: bool,
}

/// Background validation for one physical host.
pub struct HostMonitor {
    host: HostSpec,
    probe: Box<dyn ValidationProbe>,
    default_interval: Duration,
    disposal_time: Duration,
    registry: Mutex<Registry>,
    wake: Notify,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HostMonitor {
    pub fn new(host: HostSpec, probe: Box<dyn ValidationProbe>, settings: &MonitorSettings) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            host,
            probe,
            default_interval: settings.failure_detection_interval,
            disposal_time: settings.monitor_disposal_time,
            registry: Mutex::new(Registry {
                idle_since: Some(Instant::now()),
                ..Registry::default()
            }),
            wake: Notify::new(),
            shutdown_tx,
            task: Mutex::new(None),
        }
    }

    pub fn host(&self) -> &HostSpec {
        &self.host
    }

    /// Register a context. Returns `false` if this monitor has already been
    /// disposed; the caller must obtain a replacement.
    pub fn start_monitoring(&self, context: Arc<MonitorConnectionContext>) -> bool {
        {
            let mut registry = self.registry.lock();
            if registry.stopped {
                return false;
            }
            registry.contexts.push(context);
            registry.idle_since = None;
        }
        self.wake.notify_one();
        true
    }

    /// Deregister a context. Returns `true` when the registration set became empty.
    pub fn stop_monitoring(&self, context: &Arc<MonitorConnectionContext>) -> bool {
        context.invalidate();
        let now_empty = {
            let mut registry = self.registry.lock();
            registry.contexts.retain(|c| !Arc::ptr_eq(c, context));
            if registry.contexts.is_empty() && registry.idle_since.is_none() {
                registry.idle_since = Some(Instant::now());
                true
            } else {
                false
            }
        };
        if now_empty {
            tracing::debug!(host = %self.host, "No contexts left, monitor idling");
            self.wake.notify_one();
        }
        now_empty
    }

    pub fn context_count(&self) -> usize {
        self.registry.lock().contexts.len()
    }

    pub fn is_stopped(&self) -> bool {
        self.registry.lock().stopped
    }

    pub(crate) fn attach_task(&self, handle: JoinHandle<()>) {
        *self.task.lock() = Some(handle);
    }

    /// Stop the task immediately. Safe to call more than once.
    pub fn shutdown(&self) {
        self.registry.lock().stopped = true;
        self.shutdown_tx.send_replace(true);
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
    }

    fn snapshot(&self) -> Vec<Arc<MonitorConnectionContext>> {
        self.registry.lock().contexts.clone()
    }

    /// Shortest interval requested by any registered context.
    fn probe_interval(&self, contexts: &[Arc<MonitorConnectionContext>]) -> Duration {
        contexts
            .iter()
            .map(|c| c.failure_detection_interval())
            .min()
            .unwrap_or(self.default_interval)
    }

    /// Mark the monitor stopped if it has idled long enough.
    /// Returns how long to keep waiting otherwise.
    fn try_dispose(&self) -> Option<Duration> {
        let mut registry = self.registry.lock();
        if !registry.contexts.is_empty() {
            return Some(Duration::ZERO);
        }
        let idle_since = *registry.idle_since.get_or_insert_with(Instant::now);
        let idle = idle_since.elapsed();
        if idle >= self.disposal_time {
            registry.stopped = true;
            None
        } else {
            Some(self.disposal_time - idle)
        }
    }

    /// Run one probe and publish it to `contexts` plus every context
    /// registered while the probe was in flight.
    pub(crate) async fn probe_round(&self, contexts: &[Arc<MonitorConnectionContext>]) -> ProbeReport {
        let timeout = self.probe_interval(contexts);
        let started = Instant::now();

        let (valid, finished) = match time::timeout(timeout, self.probe.probe(timeout)).await {
            Ok(Ok(valid)) => (valid, Instant::now()),
            Ok(Err(e)) => {
                tracing::debug!(host = %self.host, error = %e, "Validation probe failed");
                (false, Instant::now())
            }
            Err(_) => {
                tracing::debug!(host = %self.host, timeout_ms = timeout.as_millis() as u64, "Validation probe timed out");
                (false, started + timeout)
            }
        };

        metrics::record_probe(&self.host.host_key(), valid);
        let mut targets = contexts.to_vec();
        for context in self.snapshot() {
            if !targets.iter().any(|c| Arc::ptr_eq(c, &context)) {
                targets.push(context);
            }
        }
        for context in &targets {
            context.update_connection_status(started, finished, valid);
        }

        ProbeReport { started, finished, valid }
    }

    /// Monitoring loop. Returns once disposed or shut down.
    pub async fn run(self: Arc<Self>) {
        let mut shutdown = self.shutdown_tx.subscribe();
        tracing::info!(host = %self.host, "Host monitor starting");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let contexts = self.snapshot();
            if contexts.is_empty() {
                match self.try_dispose() {
                    None => break,
                    Some(wait) => {
                        tokio::select! {
                            _ = time::sleep(wait) => {}
                            _ = self.wake.notified() => {}
                            _ = shutdown.changed() => {}
                        }
                        continue;
                    }
                }
            }

            let round_start = Instant::now();
            let interval = self.probe_interval(&contexts);
            tokio::select! {
                _ = self.probe_round(&contexts) => {}
                _ = shutdown.changed() => break,
            }

            tokio::select! {
                _ = time::sleep_until(round_start + interval) => {}
                _ = shutdown.changed() => {}
            }
        }

        self.registry.lock().stopped = true;
        tracing::info!(host = %self.host, "Host monitor stopped");
    }
}

impl std::fmt::Debug for HostMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostMonitor")
            .field("host", &self.host)
            .field("contexts", &self.context_count())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
