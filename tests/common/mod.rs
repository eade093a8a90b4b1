//! Shared utilities for integration testing.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use failover_proxy::config::ProxyConfig;
use failover_proxy::driver::{Credentials, DbConnection, DriverFactory};
use failover_proxy::{DriverError, HostRole, HostSpec, Invocation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    Up,
    /// Refuses connections, resets existing ones.
    Down,
    /// Accepts nothing and answers nothing.
    Hung,
}

#[derive(Default)]
struct ClusterInner {
    states: Mutex<HashMap<String, HostState>>,
    attempts: Mutex<Vec<String>>,
}

/// Programmable in-memory cluster acting as the driver.
#[derive(Clone, Default)]
pub struct MockCluster {
    inner: Arc<ClusterInner>,
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, host_key: &str, state: HostState) {
        self.inner.states.lock().insert(host_key.to_string(), state);
    }

    pub fn state(&self, host_key: &str) -> HostState {
        self.inner
            .states
            .lock()
            .get(host_key)
            .copied()
            .unwrap_or(HostState::Up)
    }

    /// Application connection attempts, in order.
    pub fn attempts(&self) -> Vec<String> {
        self.inner.attempts.lock().clone()
    }

    pub fn clear_attempts(&self) {
        self.inner.attempts.lock().clear();
    }
}

#[async_trait]
impl DriverFactory for MockCluster {
    async fn open_connection(
        &self,
        host: &HostSpec,
        _credentials: &Credentials,
        _timeout: Duration,
    ) -> Result<Arc<dyn DbConnection>, DriverError> {
        let key = host.host_key();
        self.inner.attempts.lock().push(key.clone());

        match self.state(&key) {
            HostState::Down => Err(DriverError::Network(format!("{key}: connection refused"))),
            HostState::Hung => std::future::pending().await,
            HostState::Up => Ok(Arc::new(MockConnection {
                host_key: key,
                cluster: self.clone(),
                closed: AtomicBool::new(false),
            })),
        }
    }
}

#[derive(Debug)]
pub struct MockConnection {
    host_key: String,
    cluster: MockCluster,
    closed: AtomicBool,
}

impl std::fmt::Debug for MockCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockCluster").finish()
    }
}

#[async_trait]
impl DbConnection for MockConnection {
    async fn call(&self, invocation: &Invocation) -> Result<Value, DriverError> {
        loop {
            if self.is_closed() {
                return Err(DriverError::Closed);
            }
            match self.cluster.state(&self.host_key) {
                HostState::Up => {
                    return Ok(json!({ "host": self.host_key, "method": invocation.method() }))
                }
                HostState::Down => return Err(DriverError::Network("connection reset by peer".into())),
                HostState::Hung => tokio::time::sleep(Duration::from_millis(5)).await,
            }
        }
    }

    async fn is_valid(&self, timeout: Duration) -> bool {
        match self.cluster.state(&self.host_key) {
            HostState::Up => !self.is_closed(),
            HostState::Down => false,
            HostState::Hung => {
                tokio::time::sleep(timeout).await;
                false
            }
        }
    }

    async fn close(&self) {
        self.abort();
    }

    fn abort(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub fn writer(name: &str) -> HostSpec {
    HostSpec::new(name, 5432, HostRole::Writer)
}

pub fn reader(name: &str) -> HostSpec {
    HostSpec::new(name, 5432, HostRole::Reader)
}

/// Config with fast detection suitable for tests.
pub fn fast_config(hosts: Vec<HostSpec>) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.cluster.hosts = hosts;
    config.monitoring.failure_detection_time_ms = 0;
    config.monitoring.failure_detection_interval_ms = 50;
    config.monitoring.failure_detection_count = 2;
    config.monitoring.monitor_disposal_time_ms = 5_000;
    config.failover.timeout_ms = 3_000;
    config.failover.connect_timeout_ms = 500;
    config.failover.max_rounds = 2;
    config.failover.round_backoff_base_ms = 10;
    config.failover.round_backoff_max_ms = 50;
    config
}

/// TCP endpoint that accepts and holds connections until stopped.
pub struct MockDbServer {
    pub port: u16,
    task: JoinHandle<()>,
}

impl MockDbServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let task = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        Self { port, task }
    }

    /// Close the listener and every accepted socket.
    pub async fn stop(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}
