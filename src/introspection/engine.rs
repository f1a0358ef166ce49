//! Introspection engine.
//!
//! Fans out one task per (database, schema), each acquiring its own pooled
//! connection, fetching the full ordered row set, decoding it and applying
//! the schema's appendix. A finished batch is pushed onto its database's
//! collection under a short lock; nothing else is shared between tasks.
//!
//! [`IntrospectionEngine::run`] returns only after every task has finished.
//! Each database gets its own outcome: a failing schema fails its database
//! (first failure in declaration order) and leaves other databases alone.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::query::build_query;
use super::row::{IntrospectionRow, RowError};
use super::{IntrospectionDatabase, IntrospectionSchema};
use crate::connector::{Connector, ConnectorError};
use crate::filter::SchemaFilter;

/// Result type for introspection.
pub type IntrospectionResult<T> = Result<T, IntrospectionError>;

/// Per-schema introspection failure.
#[derive(Debug, thiserror::Error)]
pub enum IntrospectionError {
    #[error("{database}.{schema}: {source}")]
    Connector {
        database: String,
        schema: String,
        #[source]
        source: ConnectorError,
    },

    #[error("{database}.{schema}: row {index}: {source}")]
    Row {
        database: String,
        schema: String,
        index: usize,
        #[source]
        source: RowError,
    },

    #[error("{database}.{schema}: introspection task failed: {message}")]
    TaskFailed {
        database: String,
        schema: String,
        message: String,
    },
}

impl IntrospectionError {
    pub fn database(&self) -> &str {
        match self {
            Self::Connector { database, .. }
            | Self::Row { database, .. }
            | Self::TaskFailed { database, .. } => database,
        }
    }

    pub fn schema(&self) -> &str {
        match self {
            Self::Connector { schema, .. }
            | Self::Row { schema, .. }
            | Self::TaskFailed { schema, .. } => schema,
        }
    }
}

/// A database to introspect: its connector and compiled schema filters.
#[derive(Clone)]
pub struct DatabaseTarget {
    pub name: String,
    pub connector: Arc<dyn Connector>,
    pub schemas: Vec<Arc<SchemaFilter>>,
}

impl DatabaseTarget {
    pub fn new(
        name: impl Into<String>,
        connector: Arc<dyn Connector>,
        schemas: Vec<SchemaFilter>,
    ) -> Self {
        Self {
            name: name.into(),
            connector,
            schemas: schemas.into_iter().map(Arc::new).collect(),
        }
    }
}

/// Fetch, decode and patch one schema's rows.
///
/// The connection goes back to the pool whether or not the statement
/// succeeded.
pub async fn introspect_schema(
    connector: &dyn Connector,
    database: &str,
    filter: &SchemaFilter,
) -> IntrospectionResult<IntrospectionSchema> {
    let schema = filter.name();
    let connector_error = |source: ConnectorError| IntrospectionError::Connector {
        database: database.to_string(),
        schema: schema.to_string(),
        source,
    };

    let query = build_query(filter);
    debug!(
        database = %database,
        schema = %schema,
        branches = ?query.branches,
        binds = ?query.binds,
        sql = %query.sql,
        "compiled introspection query"
    );

    let mut connection = connector.acquire().await.map_err(connector_error)?;
    let fetched = connection.execute(&query.sql, &query.binds).await;
    connector.release(connection).await;
    let result = fetched.map_err(connector_error)?;

    let mut rows = Vec::with_capacity(result.rows.len());
    let mut patched = 0;
    for (index, values) in result.rows.iter().enumerate() {
        let mut row = IntrospectionRow::from_values(&result.columns, values).map_err(|source| {
            IntrospectionError::Row {
                database: database.to_string(),
                schema: schema.to_string(),
                index,
                source,
            }
        })?;
        patched += filter.appendix().apply(&mut row);
        rows.push(row);
    }

    info!(
        database = %database,
        schema = %schema,
        rows = rows.len(),
        patched,
        "schema introspected"
    );

    Ok(IntrospectionSchema {
        name: schema.to_string(),
        no_package_name: filter.no_package_name().to_string(),
        rows,
    })
}

/// Runs every schema of every target concurrently.
pub struct IntrospectionEngine {
    targets: Vec<DatabaseTarget>,
}

impl IntrospectionEngine {
    pub fn new(targets: Vec<DatabaseTarget>) -> Self {
        Self { targets }
    }

    pub fn targets(&self) -> &[DatabaseTarget] {
        &self.targets
    }

    /// One outcome per target, in target order. Batches within a database
    /// are in completion order.
    pub async fn run(&self) -> Vec<IntrospectionResult<IntrospectionDatabase>> {
        let collections: Vec<Arc<Mutex<Vec<IntrospectionSchema>>>> = self
            .targets
            .iter()
            .map(|_| Arc::new(Mutex::new(Vec::new())))
            .collect();

        let mut tasks = Vec::new();
        for (db_index, target) in self.targets.iter().enumerate() {
            for filter in &target.schemas {
                let connector = target.connector.clone();
                let filter = filter.clone();
                let schema_name = filter.name().to_string();
                let database = target.name.clone();
                let batches = collections[db_index].clone();

                let handle = tokio::spawn(async move {
                    let batch = introspect_schema(connector.as_ref(), &database, &filter).await?;
                    batches.lock().await.push(batch);
                    Ok::<(), IntrospectionError>(())
                });
                tasks.push((db_index, schema_name, handle));
            }
        }

        debug!(tasks = tasks.len(), "waiting for schema tasks");
        let outcomes = join_all(
            tasks
                .into_iter()
                .map(|(db_index, schema, handle)| async move { (db_index, schema, handle.await) }),
        )
        .await;

        let mut failures: Vec<Option<IntrospectionError>> =
            self.targets.iter().map(|_| None).collect();
        for (db_index, schema, outcome) in outcomes {
            let error = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(error)) => error,
                Err(join_error) => IntrospectionError::TaskFailed {
                    database: self.targets[db_index].name.clone(),
                    schema,
                    message: join_error.to_string(),
                },
            };
            warn!(
                database = %error.database(),
                schema = %error.schema(),
                error = %error,
                "schema introspection failed"
            );
            failures[db_index].get_or_insert(error);
        }

        let mut results = Vec::with_capacity(self.targets.len());
        for ((target, batches), failure) in self.targets.iter().zip(collections).zip(failures) {
            match failure {
                Some(error) => results.push(Err(error)),
                None => {
                    let schemas = std::mem::take(&mut *batches.lock().await);
                    results.push(Ok(IntrospectionDatabase {
                        name: target.name.clone(),
                        schemas,
                    }));
                }
            }
        }
        results
    }
}
