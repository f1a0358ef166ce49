//! Replay connector.
//!
//! Serves a raw introspection dump (as written by the `raw-introspection`
//! emitter: `{"<schema>": [[<row values>], ...]}`) instead of querying a
//! live database. The statement text is ignored; the `:schema` bind selects
//! the batch.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{Binds, Connection, Connector, ConnectorError, ConnectorResult, ResultSet};
use crate::introspection::query::SCHEMA_BIND;
use crate::introspection::INTROSPECTION_COLUMNS;

type Batches = Arc<HashMap<String, Vec<Vec<Value>>>>;

#[derive(Debug, Clone)]
pub struct ReplayConnector {
    batches: Batches,
}

impl ReplayConnector {
    /// Build from `{schema: rows}`; schema keys are matched case-insensitively.
    pub fn from_json(value: Value) -> ConnectorResult<Self> {
        let raw: HashMap<String, Vec<Vec<Value>>> = serde_json::from_value(value)?;
        let batches = raw
            .into_iter()
            .map(|(schema, rows)| (schema.to_lowercase(), rows))
            .collect();
        Ok(Self {
            batches: Arc::new(batches),
        })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> ConnectorResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConnectorError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(serde_json::from_str(&content)?)
    }

    /// Schema names present in the dump, lower-cased and sorted.
    pub fn schemas(&self) -> Vec<String> {
        let mut names: Vec<String> = self.batches.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl Connector for ReplayConnector {
    async fn acquire(&self) -> ConnectorResult<Box<dyn Connection>> {
        Ok(Box::new(ReplayConnection {
            batches: self.batches.clone(),
        }))
    }

    async fn release(&self, _connection: Box<dyn Connection>) {}
}

struct ReplayConnection {
    batches: Batches,
}

#[async_trait]
impl Connection for ReplayConnection {
    async fn execute(&mut self, _sql: &str, binds: &Binds) -> ConnectorResult<ResultSet> {
        let schema = binds
            .get(SCHEMA_BIND)
            .ok_or_else(|| ConnectorError::Replay(format!("missing :{} bind", SCHEMA_BIND)))?
            .to_lowercase();
        let rows = self
            .batches
            .get(&schema)
            .ok_or_else(|| {
                ConnectorError::Replay(format!("no rows recorded for schema {}", schema))
            })?;

        debug!(schema = %schema, rows = rows.len(), "replaying introspection batch");
        Ok(ResultSet {
            columns: INTROSPECTION_COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows: rows.clone(),
        })
    }
}
