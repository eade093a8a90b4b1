//! Host monitor registry.
//!
//! # Responsibilities
//! - Map every node key (and alias) to the single live monitor for that node
//! - Create monitors lazily and spawn their tasks
//! - Replace monitors that disposed themselves
//! - Tear everything down on shutdown
//!
//! # Design Decisions
//! - Owned by the proxy instance, never global
//! - `DashMap::entry` serialises creation per key, so concurrent callers for
//!   the same host always get the same monitor
//! - Must be used from within a Tokio runtime (monitors are spawned tasks)

use dashmap::DashMap;
use std::sync::Arc;

use crate::config::MonitorSettings;
use crate::driver::DbConnection;
use crate::monitoring::context::MonitorConnectionContext;
use crate::monitoring::monitor::HostMonitor;
use crate::monitoring::probe::ProbeFactory;
use crate::observability::metrics;
use crate::topology::HostSpec;

pub struct MonitorService {
    monitors: Arc<DashMap<String, Arc<HostMonitor>>>,
    probes: Arc<dyn ProbeFactory>,
    settings: MonitorSettings,
}

impl MonitorService {
    pub fn new(probes: Arc<dyn ProbeFactory>, settings: MonitorSettings) -> Self {
        Self {
            monitors: Arc::new(DashMap::new()),
            probes,
            settings,
        }
    }

    /// Return the live monitor for `host`, creating it if needed.
    pub fn get_or_create_monitor(&self, host: &HostSpec) -> Arc<HostMonitor> {
        let keys = host.node_keys();

        for key in &keys {
            let found = self.monitors.get(key).map(|m| m.value().clone());
            if let Some(monitor) = found {
                if !monitor.is_stopped() {
                    self.map_aliases(host, &monitor);
                    return monitor;
                }
            }
        }

        let mut created = false;
        let monitor = {
            let mut entry = self.monitors.entry(host.host_key()).or_insert_with(|| {
                created = true;
                self.spawn_monitor(host)
            });
            if entry.is_stopped() {
                *entry = self.spawn_monitor(host);
                created = true;
            }
            Arc::clone(entry.value())
        };
        self.map_aliases(host, &monitor);
        if created {
            metrics::record_active_monitors(self.monitor_count());
        }
        monitor
    }

    fn map_aliases(&self, host: &HostSpec, monitor: &Arc<HostMonitor>) {
        for key in host.node_keys() {
            let mut entry = self.monitors.entry(key).or_insert_with(|| monitor.clone());
            if entry.is_stopped() {
                *entry = monitor.clone();
            }
        }
    }

    /// Called with the registry entry locked; must not touch `self.monitors`.
    fn spawn_monitor(&self, host: &HostSpec) -> Arc<HostMonitor> {
        let monitor = Arc::new(HostMonitor::new(
            host.clone(),
            self.probes.create(host),
            &self.settings,
        ));

        let registry = self.monitors.clone();
        let task_monitor = monitor.clone();
        let handle = tokio::spawn(async move {
            task_monitor.clone().run().await;
            registry.retain(|_, m| !Arc::ptr_eq(m, &task_monitor));
            metrics::record_active_monitors(distinct_monitors(&registry).len());
        });
        monitor.attach_task(handle);

        tracing::debug!(host = %host, "Host monitor created");
        monitor
    }

    /// Arm a new context for `host` and register it with the host's monitor.
    pub fn start_monitoring(
        &self,
        host: &HostSpec,
        connection: Option<Arc<dyn DbConnection>>,
        settings: &MonitorSettings,
    ) -> Arc<MonitorConnectionContext> {
        let context = Arc::new(MonitorConnectionContext::new(host.node_keys(), connection, settings));
        loop {
            let monitor = self.get_or_create_monitor(host);
            if monitor.start_monitoring(context.clone()) {
                context.bind_monitor(&monitor);
                return context;
            }
            // Disposed between lookup and registration.
            self.monitors.retain(|_, m| !Arc::ptr_eq(m, &monitor));
        }
    }

    /// Deregister `context` from the monitor it was registered with.
    ///
    /// `host_key` is only consulted for contexts that were never bound, since
    /// an aliased host may have been served by a monitor under another key.
    pub fn stop_monitoring(&self, host_key: &str, context: &Arc<MonitorConnectionContext>) {
        let monitor = context
            .bound_monitor()
            .or_else(|| self.monitors.get(host_key).map(|m| m.value().clone()));
        match monitor {
            Some(monitor) => {
                monitor.stop_monitoring(context);
            }
            None => context.invalidate(),
        }
    }

    pub fn monitor_for(&self, host_key: &str) -> Option<Arc<HostMonitor>> {
        self.monitors.get(host_key).map(|m| m.value().clone())
    }

    /// Number of distinct live monitors.
    pub fn monitor_count(&self) -> usize {
        distinct_monitors(&self.monitors).len()
    }

    /// Stop every monitor task and clear the registry. Idempotent.
    pub fn release_resources(&self) {
        let monitors = distinct_monitors(&self.monitors);
        self.monitors.clear();
        for monitor in &monitors {
            monitor.shutdown();
        }
        if !monitors.is_empty() {
            tracing::info!(count = monitors.len(), "Released host monitors");
        }
        metrics::record_active_monitors(0);
    }
}

impl Drop for MonitorService {
    fn drop(&mut self) {
        self.release_resources();
    }
}

fn distinct_monitors(map: &DashMap<String, Arc<HostMonitor>>) -> Vec<Arc<HostMonitor>> {
    let mut seen: Vec<Arc<HostMonitor>> = Vec::new();
    for entry in map.iter() {
        if !seen.iter().any(|m| Arc::ptr_eq(m, entry.value())) {
            seen.push(entry.value().clone());
        }
    }
    seen
}
