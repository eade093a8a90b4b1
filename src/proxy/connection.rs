//! Logical connections.
//!
//! A logical connection outlives the underlying driver connections it runs
//! on: failover swaps the current [`ActiveConnection`] in place while callers
//! keep using the same [`ProxyConnection`].

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use uuid::Uuid;

use crate::driver::DbConnection;
use crate::error::{ProxyError, ProxyResult};
use crate::pipeline::{Invocation, Pipeline};
use crate::topology::HostSpec;

/// Underlying driver connection plus the host it points at.
#[derive(Debug)]
pub struct ActiveConnection {
    pub host: HostSpec,
    pub connection: Arc<dyn DbConnection>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailoverPhase {
    Connected(HostSpec),
    FailingOver { from: HostSpec },
    Exhausted { from: HostSpec },
}

/// Record of one completed failover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailoverEvent {
    pub from: HostSpec,
    pub to: HostSpec,
    pub duration: Duration,
    /// Candidate connection attempts, including the successful one.
    pub attempts: usize,
}

/// Outcome of a failover that gave up, kept for operations queued behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ExhaustedFailover {
    pub attempts: usize,
    pub elapsed: Duration,
}

#[derive(Debug)]
struct ExhaustionRecord {
    from: Weak<ActiveConnection>,
    generation: u64,
    outcome: ExhaustedFailover,
}

/// Shared state of one logical connection.
#[derive(Debug)]
pub struct ConnectionState {
    id: Uuid,
    current: ArcSwap<ActiveConnection>,
    phase: Mutex<FailoverPhase>,
    last_failover: Mutex<Option<FailoverEvent>>,
    unseen_failover: Mutex<Option<FailoverEvent>>,
    last_exhausted: Mutex<Option<ExhaustionRecord>>,
    generation: AtomicU64,
    in_transaction: AtomicBool,
    closed: AtomicBool,
    failover_lock: tokio::sync::Mutex<()>,
}

impl ConnectionState {
    pub fn new(active: ActiveConnection) -> Self {
        let phase = FailoverPhase::Connected(active.host.clone());
        Self {
            id: Uuid::new_v4(),
            current: ArcSwap::from_pointee(active),
            phase: Mutex::new(phase),
            last_failover: Mutex::new(None),
            unseen_failover: Mutex::new(None),
            last_exhausted: Mutex::new(None),
            generation: AtomicU64::new(0),
            in_transaction: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            failover_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn current(&self) -> Arc<ActiveConnection> {
        self.current.load_full()
    }

    pub fn current_host(&self) -> HostSpec {
        self.current.load().host.clone()
    }

    pub fn phase(&self) -> FailoverPhase {
        self.phase.lock().clone()
    }

    pub(crate) fn set_phase(&self, phase: FailoverPhase) {
        *self.phase.lock() = phase;
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn last_failover(&self) -> Option<FailoverEvent> {
        self.last_failover.lock().clone()
    }

    /// Failover not yet observed by the caller, cleared on read.
    pub fn take_failover(&self) -> Option<FailoverEvent> {
        self.unseen_failover.lock().take()
    }

    pub(crate) fn failover_lock(&self) -> &tokio::sync::Mutex<()> {
        &self.failover_lock
    }

    /// Number of failovers finished so far, successful or not.
    pub(crate) fn failover_generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Point the logical connection at `active`. Any open transaction is lost.
    pub(crate) fn complete_failover(&self, active: ActiveConnection, event: FailoverEvent) {
        *self.phase.lock() = FailoverPhase::Connected(active.host.clone());
        self.current.store(Arc::new(active));
        self.in_transaction.store(false, Ordering::Release);
        *self.last_failover.lock() = Some(event.clone());
        *self.unseen_failover.lock() = Some(event);
        *self.last_exhausted.lock() = None;
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Record that a failover away from `from` gave up.
    pub(crate) fn record_exhausted(&self, from: &Arc<ActiveConnection>, outcome: ExhaustedFailover) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        *self.last_exhausted.lock() = Some(ExhaustionRecord {
            from: Arc::downgrade(from),
            generation,
            outcome,
        });
    }

    /// Exhaustion of a failover away from `from` that finished after
    /// `generation` was observed. Callers that observed it later get `None`.
    pub(crate) fn exhausted_since(
        &self,
        from: &Arc<ActiveConnection>,
        generation: u64,
    ) -> Option<ExhaustedFailover> {
        let record = self.last_exhausted.lock();
        record
            .as_ref()
            .filter(|r| std::ptr::eq(r.from.as_ptr(), Arc::as_ptr(from)) && r.generation > generation)
            .map(|r| r.outcome)
    }

    /// Terminal call: run `invocation` on the current driver connection.
    pub async fn dispatch(&self, invocation: &Invocation) -> ProxyResult<Value> {
        if self.is_closed() {
            return Err(ProxyError::Closed);
        }
        let active = self.current();
        let value = active.connection.call(invocation).await?;
        if let Some(open) = invocation.transaction_effect() {
            self.in_transaction.store(open, Ordering::Release);
        }
        Ok(value)
    }

    pub(crate) async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.current().connection.close().await;
    }
}

/// Application handle for one logical connection.
#[derive(Debug, Clone)]
pub struct ProxyConnection {
    state: Arc<ConnectionState>,
    pipeline: Arc<Pipeline>,
}

impl ProxyConnection {
    pub fn new(state: Arc<ConnectionState>, pipeline: Arc<Pipeline>) -> Self {
        Self { state, pipeline }
    }

    pub fn id(&self) -> Uuid {
        self.state.id()
    }

    /// Run `invocation` through the interceptor pipeline.
    pub async fn execute(&self, invocation: Invocation) -> ProxyResult<Value> {
        self.pipeline.invoke(&self.state, invocation).await
    }

    pub async fn query(&self, sql: &str) -> ProxyResult<Value> {
        self.execute(Invocation::query(sql)).await
    }

    pub async fn update(&self, sql: &str) -> ProxyResult<Value> {
        self.execute(Invocation::update(sql)).await
    }

    pub async fn begin(&self) -> ProxyResult<Value> {
        self.execute(Invocation::begin()).await
    }

    pub async fn commit(&self) -> ProxyResult<Value> {
        self.execute(Invocation::commit()).await
    }

    pub async fn rollback(&self) -> ProxyResult<Value> {
        self.execute(Invocation::rollback()).await
    }

    pub async fn ping(&self) -> ProxyResult<Value> {
        self.execute(Invocation::ping()).await
    }

    pub fn current_host(&self) -> HostSpec {
        self.state.current_host()
    }

    pub fn phase(&self) -> FailoverPhase {
        self.state.phase()
    }

    pub fn last_failover(&self) -> Option<FailoverEvent> {
        self.state.last_failover()
    }

    pub fn take_failover(&self) -> Option<FailoverEvent> {
        self.state.take_failover()
    }

    pub fn in_transaction(&self) -> bool {
        self.state.in_transaction()
    }

    /// Interceptor list; changes apply to calls started afterwards.
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn state(&self) -> &Arc<ConnectionState> {
        &self.state
    }

    pub async fn close(&self) {
        self.state.close().await;
        tracing::debug!(connection = %self.state.id(), "Proxy connection closed");
    }
}
