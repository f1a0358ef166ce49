//! Worker-backed connector.
//!
//! The worker process owns the physical driver pool (sized through its
//! `-pool-*` arguments); this side bounds concurrent statements per database
//! with a semaphore of `pool.max` permits, so a task holding a
//! [`WorkerConnection`] holds one slot of that pool.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use super::{Binds, Connection, Connector, ConnectorError, ConnectorResult, ResultSet};
use crate::config::PoolSettings;
use crate::worker::protocol::ConnectionParams;
use crate::worker::WorkerClient;

pub struct WorkerConnector {
    client: Arc<WorkerClient>,
    connection: ConnectionParams,
    permits: Arc<Semaphore>,
    acquire_timeout: Duration,
}

impl WorkerConnector {
    pub fn new(
        client: Arc<WorkerClient>,
        connection: ConnectionParams,
        pool: &PoolSettings,
    ) -> Self {
        Self {
            client,
            connection,
            permits: Arc::new(Semaphore::new(pool.max.max(1) as usize)),
            acquire_timeout: pool.acquire_timeout(),
        }
    }

    /// Currently free pool slots.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Refuse further acquisitions; outstanding connections finish normally.
    pub fn close(&self) {
        self.permits.close();
    }
}

#[async_trait]
impl Connector for WorkerConnector {
    async fn acquire(&self) -> ConnectorResult<Box<dyn Connection>> {
        let acquire = self.permits.clone().acquire_owned();
        let permit = tokio::time::timeout(self.acquire_timeout, acquire)
            .await
            .map_err(|_| ConnectorError::AcquireTimeout(self.acquire_timeout))?
            .map_err(|_| ConnectorError::PoolClosed)?;

        Ok(Box::new(WorkerConnection {
            client: self.client.clone(),
            connection: self.connection.clone(),
            _permit: permit,
        }))
    }

    async fn release(&self, connection: Box<dyn Connection>) {
        // Dropping the connection returns its permit.
        drop(connection);
    }
}

/// A pool slot on the worker.
pub struct WorkerConnection {
    client: Arc<WorkerClient>,
    connection: ConnectionParams,
    _permit: OwnedSemaphorePermit,
}

#[async_trait]
impl Connection for WorkerConnection {
    async fn execute(&mut self, sql: &str, binds: &Binds) -> ConnectorResult<ResultSet> {
        let response = self.client.execute_query(&self.connection, sql, binds).await?;
        debug!(
            driver = %self.connection.driver,
            rows = response.row_count,
            "worker query complete"
        );

        Ok(ResultSet {
            columns: response.columns.into_iter().map(|c| c.name).collect(),
            rows: response.rows,
        })
    }
}
