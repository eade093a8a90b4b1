//! Abstract database operations routed through the pipeline.

use serde_json::Value;

pub const METHOD_EXECUTE_QUERY: &str = "Statement.executeQuery";
pub const METHOD_EXECUTE_UPDATE: &str = "Statement.executeUpdate";
pub const METHOD_BEGIN: &str = "Connection.begin";
pub const METHOD_COMMIT: &str = "Connection.commit";
pub const METHOD_ROLLBACK: &str = "Connection.rollback";
pub const METHOD_PING: &str = "Connection.isValid";
pub const METHOD_CLOSE: &str = "Connection.close";
pub const METHOD_ABORT: &str = "Connection.abort";
pub const METHOD_IS_CLOSED: &str = "Connection.isClosed";

/// Methods answered locally by drivers; never monitored or failed over.
const LOCAL_METHODS: &[&str] = &[
    METHOD_CLOSE,
    METHOD_ABORT,
    METHOD_IS_CLOSED,
    "Connection.getAutoCommit",
    "Connection.getCatalog",
    "Connection.getSchema",
    "Connection.getTransactionIsolation",
    "Connection.isReadOnly",
    "Statement.getFetchSize",
    "Statement.getMaxRows",
];

/// One intercepted call: method identity, arguments, replay hint.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    method: String,
    args: Vec<Value>,
    idempotent: bool,
}

impl Invocation {
    pub fn new(method: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            args,
            idempotent: false,
        }
    }

    pub fn query(sql: impl Into<String>) -> Self {
        Self::new(METHOD_EXECUTE_QUERY, vec![Value::String(sql.into())]).idempotent(true)
    }

    pub fn update(sql: impl Into<String>) -> Self {
        Self::new(METHOD_EXECUTE_UPDATE, vec![Value::String(sql.into())])
    }

    pub fn begin() -> Self {
        Self::new(METHOD_BEGIN, Vec::new())
    }

    pub fn commit() -> Self {
        Self::new(METHOD_COMMIT, Vec::new())
    }

    pub fn rollback() -> Self {
        Self::new(METHOD_ROLLBACK, Vec::new())
    }

    pub fn ping() -> Self {
        Self::new(METHOD_PING, Vec::new()).idempotent(true)
    }

    /// Mark whether the operation may be replayed after a failover.
    pub fn idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = idempotent;
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn args_mut(&mut self) -> &mut Vec<Value> {
        &mut self.args
    }

    pub fn is_idempotent(&self) -> bool {
        self.idempotent
    }

    pub fn is_network_bound(&self) -> bool {
        !LOCAL_METHODS.contains(&self.method.as_str())
    }

    /// `Some(true)` opens a transaction, `Some(false)` ends one.
    pub fn transaction_effect(&self) -> Option<bool> {
        match self.method.as_str() {
            METHOD_BEGIN => Some(true),
            METHOD_COMMIT | METHOD_ROLLBACK => Some(false),
            _ => None,
        }
    }
}
