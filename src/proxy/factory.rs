//! Proxy construction and ownership of shared services.
//!
//! # Responsibilities
//! - Validate configuration once, at setup
//! - Own the monitor registry, topology, driver and credentials
//! - Open logical connections with the default interceptor pipeline
//! - Tear down background monitoring on shutdown

use std::sync::Arc;
use tokio::time::timeout;

use crate::config::loader::ConfigError;
use crate::config::validation::validate_config;
use crate::config::{FailoverSettings, MonitorSettings, ProxyConfig};
use crate::driver::{CredentialsProvider, DbConnection, DriverFactory};
use crate::error::{DriverError, ProxyError, ProxyResult};
use crate::failover::FailoverCoordinator;
use crate::monitoring::{DriverProbeFactory, MonitorService};
use crate::pipeline::{FailoverInterceptor, HostMonitoringInterceptor, Interceptor, Pipeline};
use crate::proxy::connection::{ActiveConnection, ConnectionState, ProxyConnection};
use crate::topology::{HostListProvider, HostSpec};

pub struct FailoverProxy {
    monitoring_enabled: bool,
    failover_enabled: bool,
    monitor_settings: MonitorSettings,
    failover_settings: FailoverSettings,
    driver: Arc<dyn DriverFactory>,
    credentials: Arc<dyn CredentialsProvider>,
    monitors: Arc<MonitorService>,
    coordinator: Arc<FailoverCoordinator>,
}

impl FailoverProxy {
    /// Build a proxy. Invalid settings fail here, never at call time.
    pub fn new(
        config: &ProxyConfig,
        topology: Arc<dyn HostListProvider>,
        driver: Arc<dyn DriverFactory>,
        credentials: Arc<dyn CredentialsProvider>,
    ) -> ProxyResult<Self> {
        validate_config(config).map_err(|errors| ProxyError::from(ConfigError::Validation(errors)))?;

        let monitor_settings = config.monitoring.settings();
        let failover_settings = config.failover.settings();
        let probes = Arc::new(DriverProbeFactory::new(driver.clone(), credentials.clone()));
        let monitors = Arc::new(MonitorService::new(probes, monitor_settings));
        let coordinator = Arc::new(FailoverCoordinator::new(
            topology,
            driver.clone(),
            credentials.clone(),
            failover_settings,
        ));

        Ok(Self {
            monitoring_enabled: config.monitoring.enabled,
            failover_enabled: config.failover.enabled,
            monitor_settings,
            failover_settings,
            driver,
            credentials,
            monitors,
            coordinator,
        })
    }

    /// Open a logical connection to `host`.
    pub async fn connect(&self, host: &HostSpec) -> ProxyResult<ProxyConnection> {
        let connection = self.open(host).await?;
        let state = Arc::new(ConnectionState::new(ActiveConnection {
            host: host.clone(),
            connection,
        }));
        tracing::info!(connection = %state.id(), host = %host, "Proxy connection opened");
        Ok(ProxyConnection::new(state, Arc::new(self.default_pipeline())))
    }

    async fn open(&self, host: &HostSpec) -> ProxyResult<Arc<dyn DbConnection>> {
        let credentials = self.credentials.credentials(host).await?;
        let budget = self.failover_settings.connect_timeout;
        match timeout(budget, self.driver.open_connection(host, &credentials, budget)).await {
            Ok(Ok(connection)) => Ok(connection),
            Ok(Err(source)) => Err(ProxyError::ConnectionOpenFailure {
                host: host.host_key(),
                source,
            }),
            Err(_) => Err(ProxyError::ConnectionOpenFailure {
                host: host.host_key(),
                source: DriverError::Timeout(budget),
            }),
        }
    }

    /// `[failover, host-monitoring]`, minus whichever is disabled.
    pub fn default_pipeline(&self) -> Pipeline {
        let mut interceptors: Vec<Arc<dyn Interceptor>> = Vec::new();
        if self.failover_enabled {
            interceptors.push(Arc::new(FailoverInterceptor::new(self.coordinator.clone())));
        }
        if self.monitoring_enabled {
            interceptors.push(Arc::new(HostMonitoringInterceptor::new(
                self.monitors.clone(),
                self.monitor_settings,
            )));
        }
        Pipeline::new(interceptors)
    }

    pub fn monitor_service(&self) -> &Arc<MonitorService> {
        &self.monitors
    }

    pub fn monitor_settings(&self) -> &MonitorSettings {
        &self.monitor_settings
    }

    pub fn failover_settings(&self) -> &FailoverSettings {
        &self.failover_settings
    }

    /// Stop every host monitor. Open logical connections keep working
    /// without monitoring.
    pub fn shutdown(&self) {
        self.monitors.release_resources();
    }
}

impl std::fmt::Debug for FailoverProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailoverProxy")
            .field("monitoring_enabled", &self.monitoring_enabled)
            .field("failover_enabled", &self.failover_enabled)
            .field("monitors", &self.monitors.monitor_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::StaticCredentials;
    use crate::proxy::testing::ScriptedDriver;
    use crate::topology::{HostRole, StaticHostListProvider};

    fn build(config: &ProxyConfig, driver: Arc<ScriptedDriver>) -> ProxyResult<FailoverProxy> {
        FailoverProxy::new(
            config,
            Arc::new(StaticHostListProvider::new(config.cluster.hosts.clone())),
            driver,
            Arc::new(StaticCredentials::password("app", "pw")),
        )
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_at_setup() {
        let mut config = ProxyConfig::default();
        config.monitoring.failure_detection_interval_ms = 0;
        let err = build(&config, Arc::new(ScriptedDriver::default())).unwrap_err();
        assert!(matches!(err, ProxyError::Configuration(ref msg) if msg.contains("failure_detection_interval_ms")));
    }

    #[tokio::test]
    async fn test_default_pipeline_order() {
        let config = ProxyConfig::default();
        let proxy = build(&config, Arc::new(ScriptedDriver::default())).unwrap();
        assert_eq!(proxy.default_pipeline().names(), vec!["failover", "host-monitoring"]);

        let mut config = ProxyConfig::default();
        config.monitoring.enabled = false;
        let proxy = build(&config, Arc::new(ScriptedDriver::default())).unwrap();
        assert_eq!(proxy.default_pipeline().names(), vec!["failover"]);
    }

    #[tokio::test]
    async fn test_connect_and_shutdown() {
        let driver = Arc::new(ScriptedDriver::default());
        let proxy = build(&ProxyConfig::default(), driver.clone()).unwrap();
        let host = HostSpec::new("db-1", 5432, HostRole::Writer);

        let conn = proxy.connect(&host).await.unwrap();
        conn.query("select 1").await.unwrap();
        assert_eq!(conn.current_host(), host);
        assert_eq!(proxy.monitor_service().monitor_count(), 1);

        proxy.shutdown();
        assert_eq!(proxy.monitor_service().monitor_count(), 0);
        conn.query("select 1").await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        let driver = Arc::new(ScriptedDriver::default());
        driver.set_down("db-1:5432");
        let proxy = build(&ProxyConfig::default(), driver).unwrap();
        let err = proxy
            .connect(&HostSpec::new("db-1", 5432, HostRole::Writer))
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::ConnectionOpenFailure { ref host, .. } if host == "db-1:5432"));
    }
}
