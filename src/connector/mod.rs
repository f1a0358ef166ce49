//! Connector contract between the introspection engine and a database.
//!
//! A [`Connector`] hands out pooled [`Connection`]s; a connection executes one
//! statement with named binds and returns the fully materialized result set.
//! The engine never sees drivers, only this trait pair.
//!
//! Two implementations ship with the crate:
//! - [`WorkerConnector`]: executes through the NDJSON database worker, with a
//!   semaphore-bounded pool and an acquire timeout.
//! - [`ReplayConnector`]: serves a previously captured raw introspection dump.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::worker::WorkerError;

mod replay;
mod worker;

pub use replay::ReplayConnector;
pub use worker::{WorkerConnection, WorkerConnector};

/// Named bind values for a statement.
pub type Binds = BTreeMap<String, String>;

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Connectivity errors.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("timed out after {0:?} waiting for a pooled connection")]
    AcquireTimeout(Duration),

    #[error("connection pool is closed")]
    PoolClosed,

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error("replay: {0}")]
    Replay(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid replay data: {0}")]
    Json(#[from] serde_json::Error),
}

/// Materialized statement result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// One pooled connection.
#[async_trait]
pub trait Connection: Send {
    /// Run `sql` with `binds` and return every row.
    async fn execute(&mut self, sql: &str, binds: &Binds) -> ConnectorResult<ResultSet>;
}

/// Source of pooled connections for one database.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn acquire(&self) -> ConnectorResult<Box<dyn Connection>>;

    /// Return a connection to the pool.
    async fn release(&self, connection: Box<dyn Connection>);
}
