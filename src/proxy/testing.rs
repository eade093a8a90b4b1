//! In-memory driver doubles shared by unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::driver::{Credentials, DbConnection, DriverFactory};
use crate::error::DriverError;
use crate::pipeline::Invocation;
use crate::proxy::{ActiveConnection, ConnectionState};
use crate::topology::{HostRole, HostSpec};

#[derive(Debug)]
pub struct RecordingConnection {
    host: String,
    calls: AtomicUsize,
    last_args: Mutex<Vec<Value>>,
    failure: Mutex<Option<DriverError>>,
    hang: AtomicBool,
    closed: AtomicBool,
}

impl RecordingConnection {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            calls: AtomicUsize::new(0),
            last_args: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            hang: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_args(&self) -> Vec<Value> {
        self.last_args.lock().clone()
    }

    pub fn fail_with(&self, error: DriverError) {
        *self.failure.lock() = Some(error);
    }

    /// Calls block until the connection is aborted.
    pub fn hang(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl DbConnection for RecordingConnection {
    async fn call(&self, invocation: &Invocation) -> Result<Value, DriverError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_args.lock() = invocation.args().to_vec();
        while self.hang.load(Ordering::SeqCst) && !self.is_closed() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        if self.is_closed() {
            return Err(DriverError::Closed);
        }
        let failure = self.failure.lock().clone();
        if let Some(err) = failure {
            return Err(err);
        }
        Ok(json!({ "host": self.host, "method": invocation.method() }))
    }

    async fn is_valid(&self, _timeout: Duration) -> bool {
        !self.is_closed()
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

/// Logical connection on a fresh [`RecordingConnection`] to `host:5432`.
pub fn state_on(host: &str) -> (Arc<ConnectionState>, Arc<RecordingConnection>) {
    let conn = Arc::new(RecordingConnection::new(host));
    let state = Arc::new(ConnectionState::new(ActiveConnection {
        host: HostSpec::new(host, 5432, HostRole::Writer),
        connection: conn.clone(),
    }));
    (state, conn)
}

/// Driver whose hosts can be scripted to refuse or hang.
#[derive(Default)]
pub struct ScriptedDriver {
    failures_left: Mutex<HashMap<String, usize>>,
    hanging: Mutex<Vec<String>>,
    attempts: Mutex<Vec<String>>,
    opened: Mutex<Vec<Arc<RecordingConnection>>>,
}

impl ScriptedDriver {
    pub fn set_down(&self, host_key: &str) {
        self.failures_left.lock().insert(host_key.to_string(), usize::MAX);
    }

    /// Refuse the next `n` attempts against `host_key`.
    pub fn fail_times(&self, host_key: &str, n: usize) {
        self.failures_left.lock().insert(host_key.to_string(), n);
    }

    pub fn set_hanging(&self, host_key: &str) {
        self.hanging.lock().push(host_key.to_string());
    }

    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().clone()
    }

    pub fn opened(&self) -> Vec<Arc<RecordingConnection>> {
        self.opened.lock().clone()
    }
}

#[async_trait]
impl DriverFactory for ScriptedDriver {
    async fn open_connection(
        &self,
        host: &HostSpec,
        _credentials: &Credentials,
        _timeout: Duration,
    ) -> Result<Arc<dyn DbConnection>, DriverError> {
        let key = host.host_key();
        self.attempts.lock().push(key.clone());

        let hanging = self.hanging.lock().contains(&key);
        if hanging {
            std::future::pending::<()>().await;
        }
        {
            let mut failures = self.failures_left.lock();
            if let Some(left) = failures.get_mut(&key) {
                if *left > 0 {
                    *left -= 1;
                    return Err(DriverError::Network(format!("{key}: connection refused")));
                }
            }
        }

        let conn = Arc::new(RecordingConnection::new(&host.host));
        self.opened.lock().push(conn.clone());
        Ok(conn)
    }
}
