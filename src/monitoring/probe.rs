//! Validation probes.
//!
//! A probe performs one liveness check against a host. The host monitor owns
//! exactly one probe, created through a [`ProbeFactory`], and bounds every
//! call with its own timeout.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::driver::{CredentialsProvider, DbConnection, DriverFactory};
use crate::error::{ProxyError, ProxyResult};
use crate::topology::HostSpec;

/// One liveness check.
#[async_trait]
pub trait ValidationProbe: Send + Sync {
    /// `Ok(true)` when the host answered in time. Errors count as invalid.
    async fn probe(&self, timeout: Duration) -> ProxyResult<bool>;
}

/// Creates the probe a host monitor will use for its host.
pub trait ProbeFactory: Send + Sync {
    fn create(&self, host: &HostSpec) -> Box<dyn ValidationProbe>;
}

/// Probe that keeps a dedicated monitoring connection open to the host.
///
/// The connection is opened lazily and dropped after any failed check, so the
/// next round reconnects and an unreachable host surfaces as a connect failure.
pub struct DriverProbe {
    host: HostSpec,
    driver: Arc<dyn DriverFactory>,
    credentials: Arc<dyn CredentialsProvider>,
    connection: Mutex<Option<Arc<dyn DbConnection>>>,
}

impl DriverProbe {
    pub fn new(
        host: HostSpec,
        driver: Arc<dyn DriverFactory>,
        credentials: Arc<dyn CredentialsProvider>,
    ) -> Self {
        Self {
            host,
            driver,
            credentials,
            connection: Mutex::new(None),
        }
    }

    async fn open(&self, timeout: Duration) -> ProxyResult<Arc<dyn DbConnection>> {
        let credentials = self.credentials.credentials(&self.host).await?;
        self.driver
            .open_connection(&self.host, &credentials, timeout)
            .await
            .map_err(|e| ProxyError::ProbeFailure {
                host: self.host.host_key(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl ValidationProbe for DriverProbe {
    async fn probe(&self, timeout: Duration) -> ProxyResult<bool> {
        let mut slot = self.connection.lock().await;
        let existing = slot.as_ref().filter(|conn| !conn.is_closed()).cloned();
        let connection = match existing {
            Some(conn) => conn,
            None => {
                let conn = self.open(timeout).await?;
                *slot = Some(conn.clone());
                conn
            }
        };

        let valid = connection.is_valid(timeout).await;
        if !valid {
            connection.abort();
            *slot = None;
        }
        Ok(valid)
    }
}

impl Drop for DriverProbe {
    fn drop(&mut self) {
        if let Some(conn) = self.connection.get_mut().take() {
            conn.abort();
        }
    }
}

/// Builds a [`DriverProbe`] per host.
pub struct DriverProbeFactory {
    driver: Arc<dyn DriverFactory>,
    credentials: Arc<dyn CredentialsProvider>,
}

impl DriverProbeFactory {
    pub fn new(driver: Arc<dyn DriverFactory>, credentials: Arc<dyn CredentialsProvider>) -> Self {
        Self { driver, credentials }
    }
}

impl ProbeFactory for DriverProbeFactory {
    fn create(&self, host: &HostSpec) -> Box<dyn ValidationProbe> {
        Box::new(DriverProbe::new(
            host.clone(),
            self.driver.clone(),
            self.credentials.clone(),
        ))
    }
}
