//! Failover coordination.
//!
//! # Responsibilities
//! - Serialise failovers per logical connection and coalesce waiters
//! - Walk the candidate list under per-candidate and overall deadlines
//! - Swap the logical connection onto the first reachable host
//!
//! # Design Decisions
//! - Passes re-query topology and back off between themselves, bounded by
//!   `max_rounds` and the overall deadline, whichever comes first
//! - The triggering error is retained as the cause of `FailoverExhausted`
//! - Operations queued behind a failover that gave up share its exhaustion
//!   instead of starting another one; later operations start afresh

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, timeout_at, Instant};

use crate::config::FailoverSettings;
use crate::driver::{CredentialsProvider, DbConnection, DriverFactory};
use crate::error::{DriverError, ProxyError, ProxyResult};
use crate::failover::selector::HostSelector;
use crate::observability::metrics;
use crate::proxy::connection::ExhaustedFailover;
use crate::proxy::{ActiveConnection, ConnectionState, FailoverEvent, FailoverPhase};
use crate::resilience::backoff::calculate_backoff;
use crate::topology::{HostListProvider, HostSpec};

pub struct FailoverCoordinator {
    topology: Arc<dyn HostListProvider>,
    driver: Arc<dyn DriverFactory>,
    credentials: Arc<dyn CredentialsProvider>,
    settings: FailoverSettings,
    selector: HostSelector,
}

impl FailoverCoordinator {
    pub fn new(
        topology: Arc<dyn HostListProvider>,
        driver: Arc<dyn DriverFactory>,
        credentials: Arc<dyn CredentialsProvider>,
        settings: FailoverSettings,
    ) -> Self {
        Self {
            topology,
            driver,
            credentials,
            settings,
            selector: HostSelector::new(settings.reader_selection),
        }
    }

    pub fn settings(&self) -> &FailoverSettings {
        &self.settings
    }

    /// Move `state` off `failed` onto a reachable candidate.
    ///
    /// If another operation already replaced `failed`, its event is returned
    /// without a second failover. If one gave up on `failed` while this call
    /// was waiting, its exhaustion is returned with this call's own cause.
    pub async fn failover(
        &self,
        state: &ConnectionState,
        failed: &Arc<ActiveConnection>,
        cause: ProxyError,
    ) -> ProxyResult<FailoverEvent> {
        let observed = state.failover_generation();
        let _guard = state.failover_lock().lock().await;

        if let Some(ExhaustedFailover { attempts, elapsed }) = state.exhausted_since(failed, observed) {
            tracing::debug!(
                connection = %state.id(),
                host = %failed.host,
                "Failover already exhausted by a concurrent operation"
            );
            return Err(ProxyError::FailoverExhausted {
                attempts,
                elapsed,
                cause: Box::new(cause),
            });
        }

        if !Arc::ptr_eq(&state.current(), failed) {
            if let Some(event) = state.last_failover() {
                tracing::debug!(
                    connection = %state.id(),
                    new_host = %event.to,
                    "Failover already completed by a concurrent operation"
                );
                return Ok(event);
            }
        }

        failed.connection.abort();
        state.set_phase(FailoverPhase::FailingOver {
            from: failed.host.clone(),
        });
        tracing::warn!(
            connection = %state.id(),
            host = %failed.host,
            cause = %cause,
            "Starting failover"
        );

        let started = Instant::now();
        let deadline = started + self.settings.timeout;
        let mut attempts = 0usize;
        let outcome = timeout_at(deadline, self.reconnect(&failed.host, deadline, &mut attempts)).await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(Some(active)) => {
                let event = FailoverEvent {
                    from: failed.host.clone(),
                    to: active.host.clone(),
                    duration: elapsed,
                    attempts,
                };
                state.complete_failover(active, event.clone());
                metrics::record_failover("success", elapsed);
                tracing::info!(
                    connection = %state.id(),
                    from = %event.from,
                    to = %event.to,
                    attempts,
                    duration_ms = elapsed.as_millis() as u64,
                    "Failover succeeded"
                );
                Ok(event)
            }
            Ok(None) | Err(_) => {
                state.set_phase(FailoverPhase::Exhausted {
                    from: failed.host.clone(),
                });
                state.record_exhausted(failed, ExhaustedFailover { attempts, elapsed });
                metrics::record_failover("exhausted", elapsed);
                tracing::error!(
                    connection = %state.id(),
                    host = %failed.host,
                    attempts,
                    duration_ms = elapsed.as_millis() as u64,
                    "Failover exhausted"
                );
                Err(ProxyError::FailoverExhausted {
                    attempts,
                    elapsed,
                    cause: Box::new(cause),
                })
            }
        }
    }

    async fn reconnect(
        &self,
        failed: &HostSpec,
        deadline: Instant,
        attempts: &mut usize,
    ) -> Option<ActiveConnection> {
        let role = self.settings.mode.preferred_role();

        for round in 0..self.settings.max_rounds {
            if round > 0 {
                let delay = calculate_backoff(
                    round,
                    self.settings.round_backoff_base_ms,
                    self.settings.round_backoff_max_ms,
                );
                tokio::time::sleep_until(deadline.min(Instant::now() + delay)).await;
            }

            let candidates = match self.topology.candidate_hosts(failed, role).await {
                Ok(hosts) => self.settings.mode.arrange(hosts, &self.selector),
                Err(e) => {
                    tracing::warn!(round, error = %e, "Topology lookup failed");
                    continue;
                }
            };
            if candidates.is_empty() {
                tracing::debug!(round, host = %failed, "No failover candidates");
                continue;
            }

            for host in candidates {
                let now = Instant::now();
                if now >= deadline {
                    return None;
                }
                let budget = self.settings.connect_timeout.min(deadline - now);
                *attempts += 1;

                match self.open(&host, budget).await {
                    Ok(connection) => return Some(ActiveConnection { host, connection }),
                    Err(e) => {
                        tracing::warn!(round, attempt = *attempts, host = %host, error = %e, "Candidate unreachable");
                    }
                }
            }
        }
        None
    }

    async fn open(&self, host: &HostSpec, budget: Duration) -> ProxyResult<Arc<dyn DbConnection>> {
        let credentials = self.credentials.credentials(host).await?;
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
}

impl std::fmt::Debug for FailoverCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailoverCoordinator")
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::StaticCredentials;
    use crate::failover::FailoverMode;
    use crate::proxy::testing::{state_on, ScriptedDriver};
    use crate::topology::{HostRole, StaticHostListProvider};

    fn settings(mode: FailoverMode) -> FailoverSettings {
        FailoverSettings {
            mode,
            timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(1),
            max_rounds: 1,
            round_backoff_base_ms: 10,
            round_backoff_max_ms: 50,
            ..FailoverSettings::default()
        }
    }

    fn coordinator(
        hosts: Vec<HostSpec>,
        driver: Arc<ScriptedDriver>,
        settings: FailoverSettings,
    ) -> FailoverCoordinator {
        FailoverCoordinator::new(
            Arc::new(StaticHostListProvider::new(hosts)),
            driver,
            Arc::new(StaticCredentials::password("app", "pw")),
            settings,
        )
    }

    fn reader(name: &str) -> HostSpec {
        HostSpec::new(name, 5432, HostRole::Reader)
    }

    fn cause() -> ProxyError {
        ProxyError::NodeUnhealthy { host: "w1:5432".into() }
    }

    #[tokio::test]
    async fn test_stops_at_first_reachable_candidate() {
        let writer = HostSpec::new("w1", 5432, HostRole::Writer);
        let hosts = vec![writer, reader("r1"), reader("r2"), reader("r3"), reader("r4")];
        let driver = Arc::new(ScriptedDriver::default());
        driver.set_down("r1:5432");
        driver.set_down("r2:5432");

        let coordinator = coordinator(hosts, driver.clone(), settings(FailoverMode::StrictReader));
        let (state, _conn) = state_on("w1");
        let failed = state.current();

        let event = coordinator.failover(&state, &failed, cause()).await.unwrap();

        assert_eq!(event.to.host, "r3");
        assert_eq!(event.attempts, 3);
        assert_eq!(driver.attempts(), vec!["r1:5432", "r2:5432", "r3:5432"]);
        assert_eq!(state.current_host().host, "r3");
        assert_eq!(state.phase(), FailoverPhase::Connected(event.to.clone()));
        assert!(failed.connection.is_closed());
    }

    #[tokio::test]
    async fn test_no_candidates_is_exhausted() {
        let writer = HostSpec::new("w1", 5432, HostRole::Writer);
        let driver = Arc::new(ScriptedDriver::default());
        let mut s = settings(FailoverMode::StrictWriter);
        s.max_rounds = 3;
        let coordinator = coordinator(vec![writer.clone()], driver.clone(), s);
        let (state, _conn) = state_on("w1");
        let failed = state.current();

        let started = Instant::now();
        let err = coordinator.failover(&state, &failed, cause()).await.unwrap_err();
        assert!(started.elapsed() < s.timeout);

        match err {
            ProxyError::FailoverExhausted { attempts, cause, .. } => {
                assert_eq!(attempts, 0);
                assert!(matches!(*cause, ProxyError::NodeUnhealthy { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(state.phase(), FailoverPhase::Exhausted { from: writer });
        assert!(driver.attempts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_candidates_respect_overall_deadline() {
        let writer = HostSpec::new("w1", 5432, HostRole::Writer);
        let driver = Arc::new(ScriptedDriver::default());
        driver.set_hanging("r1:5432");
        driver.set_hanging("r2:5432");
        let mut s = settings(FailoverMode::StrictReader);
        s.timeout = Duration::from_secs(3);
        s.connect_timeout = Duration::from_secs(2);
        s.max_rounds = 10;
        let coordinator = coordinator(vec![writer.clone(), reader("r1"), reader("r2")], driver.clone(), s);
        let (state, _conn) = state_on("w1");
        let failed = state.current();

        let started = Instant::now();
        let err = coordinator.failover(&state, &failed, cause()).await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, ProxyError::FailoverExhausted { .. }));
        assert!(elapsed >= Duration::from_secs(3));
        assert!(elapsed < Duration::from_millis(3_100));
        // r1 consumed 2s, r2 got the remaining 1s.
        assert_eq!(driver.attempts(), vec!["r1:5432", "r2:5432"]);
    }

    #[tokio::test]
    async fn test_rounds_retry_after_recovery() {
        let writer = HostSpec::new("w1", 5432, HostRole::Writer);
        let driver = Arc::new(ScriptedDriver::default());
        driver.fail_times("r1:5432", 1);
        let mut s = settings(FailoverMode::StrictReader);
        s.max_rounds = 3;
        let coordinator = coordinator(vec![writer, reader("r1")], driver.clone(), s);
        let (state, _conn) = state_on("w1");
        let failed = state.current();

        let event = coordinator.failover(&state, &failed, cause()).await.unwrap();
        assert_eq!(event.to.host, "r1");
        assert_eq!(event.attempts, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_failovers_coalesce() {
        let writer = HostSpec::new("w1", 5432, HostRole::Writer);
        let driver = Arc::new(ScriptedDriver::default());
        let coordinator = Arc::new(coordinator(
            vec![writer, reader("r1"), reader("r2")],
            driver.clone(),
            settings(FailoverMode::StrictReader),
        ));
        let (state, _conn) = state_on("w1");
        let failed = state.current();

        let a = {
            let (coordinator, state, failed) = (coordinator.clone(), state.clone(), failed.clone());
            tokio::spawn(async move { coordinator.failover(&state, &failed, cause()).await })
        };
        let b = {
            let (coordinator, state, failed) = (coordinator.clone(), state.clone(), failed.clone());
            tokio::spawn(async move { coordinator.failover(&state, &failed, cause()).await })
        };

        let ea = a.await.unwrap().unwrap();
        let eb = b.await.unwrap().unwrap();
        assert_eq!(ea.to, eb.to);
        assert_eq!(driver.attempts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_shares_exhaustion_instead_of_retrying() {
        let writer = HostSpec::new("w1", 5432, HostRole::Writer);
        let driver = Arc::new(ScriptedDriver::default());
        driver.set_hanging("r1:5432");
        let mut s = settings(FailoverMode::StrictReader);
        s.timeout = Duration::from_secs(3);
        s.connect_timeout = Duration::from_secs(3);
        let coordinator = coordinator(vec![writer, reader("r1")], driver.clone(), s);
        let (state, _conn) = state_on("w1");
        let failed = state.current();

        let started = Instant::now();
        let (a, b) = tokio::join!(
            coordinator.failover(&state, &failed, cause()),
            coordinator.failover(&state, &failed, ProxyError::Closed),
        );
        let elapsed = started.elapsed();

        assert!(matches!(a, Err(ProxyError::FailoverExhausted { attempts: 1, .. })));
        match b {
            Err(ProxyError::FailoverExhausted { attempts, cause, .. }) => {
                assert_eq!(attempts, 1);
                assert!(matches!(*cause, ProxyError::Closed));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(elapsed < Duration::from_millis(3_100));
        assert_eq!(driver.attempts(), vec!["r1:5432"]);

        // A later operation on the same connection tries again.
        let again = coordinator.failover(&state, &failed, cause()).await;
        assert!(matches!(again, Err(ProxyError::FailoverExhausted { .. })));
        assert_eq!(driver.attempts(), vec!["r1:5432", "r1:5432"]);
    }
}
