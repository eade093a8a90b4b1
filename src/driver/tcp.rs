//! TCP-level driver.
//!
//! Opens a plain socket to the host and judges liveness from socket state.
//! It speaks no database protocol, which makes it suitable for reachability
//! monitoring of real endpoints and for the `watch` command.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::driver::{Credentials, DbConnection, DriverFactory};
use crate::error::DriverError;
use crate::pipeline::Invocation;
use crate::topology::HostSpec;

#[derive(Debug, Default, Clone, Copy)]
pub struct TcpDriver;

impl TcpDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DriverFactory for TcpDriver {
    async fn open_connection(
        &self,
        host: &HostSpec,
        credentials: &Credentials,
        connect_timeout: Duration,
    ) -> Result<Arc<dyn DbConnection>, DriverError> {
        let connect = TcpStream::connect((host.host.as_str(), host.port));
        let stream = match timeout(connect_timeout, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(DriverError::Network(e.to_string())),
            Err(_) => return Err(DriverError::Timeout(connect_timeout)),
        };
        let _ = stream.set_nodelay(true);

        tracing::debug!(host = %host, user = credentials.username(), "TCP connection opened");
        Ok(Arc::new(TcpConnection {
            host: host.clone(),
            stream: Mutex::new(Some(Arc::new(stream))),
            closed: AtomicBool::new(false),
        }))
    }
}

#[derive(Debug)]
pub struct TcpConnection {
    host: HostSpec,
    stream: Mutex<Option<Arc<TcpStream>>>,
    closed: AtomicBool,
}

impl TcpConnection {
    fn check_alive(&self) -> Result<(), DriverError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DriverError::Closed);
        }
        let stream = self.stream.lock().clone().ok_or(DriverError::Closed)?;

        // Bytes the peer sends unprompted are discarded.
        let mut buf = [0u8; 64];
        match stream.try_read(&mut buf) {
            Ok(0) => Err(DriverError::Network(format!("{} closed the connection", self.host))),
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(DriverError::Network(e.to_string())),
        }
    }
}

#[async_trait]
impl DbConnection for TcpConnection {
    async fn call(&self, invocation: &Invocation) -> Result<Value, DriverError> {
        self.check_alive()?;
        Ok(json!({
            "host": self.host.host_key(),
            "method": invocation.method(),
        }))
    }

    async fn is_valid(&self, _timeout: Duration) -> bool {
        self.check_alive().is_ok()
    }

    async fn close(&self) {
        self.abort();
    }

    fn abort(&self) {
        self.closed.store(true, Ordering::Release);
        self.stream.lock().take();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::HostRole;
    use tokio::net::TcpListener;

    fn creds() -> Credentials {
        Credentials::Password {
            username: "app".into(),
            password: "pw".into(),
        }
    }

    #[tokio::test]
    async fn test_detects_peer_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let host = HostSpec::new("127.0.0.1", port, HostRole::Writer);

        let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
        let conn = TcpDriver::new()
            .open_connection(&host, &creds(), Duration::from_secs(1))
            .await
            .unwrap();
        let server_side = accept.await.unwrap();

        assert!(conn.is_valid(Duration::from_millis(100)).await);
        assert!(conn.call(&Invocation::ping()).await.is_ok());

        drop(server_side);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!conn.is_valid(Duration::from_millis(100)).await);
    }

    #[tokio::test]
    async fn test_abort_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let host = HostSpec::new("127.0.0.1", port, HostRole::Writer);

        let conn = TcpDriver::new()
            .open_connection(&host, &creds(), Duration::from_secs(1))
            .await
            .unwrap();
        conn.abort();
        assert!(conn.is_closed());
        assert_eq!(conn.call(&Invocation::ping()).await.unwrap_err(), DriverError::Closed);
    }

    #[tokio::test]
    async fn test_refused_connection_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let host = HostSpec::new("127.0.0.1", port, HostRole::Writer);
        let err = TcpDriver::new()
            .open_connection(&host, &creds(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.is_network());
    }
}
