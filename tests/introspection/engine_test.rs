use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dbstubs::config::{AppendixSettings, SchemaSettings};
use dbstubs::connector::{
    Binds, Connection, Connector, ConnectorError, ConnectorResult, ResultSet,
};
use dbstubs::filter::SchemaFilter;
use dbstubs::introspection::query::SCHEMA_BIND;
use dbstubs::introspection::{
    introspect_schema, DatabaseTarget, IntrospectionEngine, IntrospectionError,
    INTROSPECTION_COLUMNS,
};
use serde_json::{json, Value};

/// Serves canned rows per schema, optionally slowly, optionally failing.
#[derive(Default)]
struct MemoryConnector {
    rows: HashMap<String, Vec<Vec<Value>>>,
    delays: HashMap<String, Duration>,
    failing: Vec<String>,
    columns: Option<Vec<String>>,
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl MemoryConnector {
    fn with_schema(mut self, schema: &str, rows: Vec<Vec<Value>>) -> Self {
        self.rows.insert(schema.to_uppercase(), rows);
        self
    }

    fn slow(mut self, schema: &str, delay: Duration) -> Self {
        self.delays.insert(schema.to_uppercase(), delay);
        self
    }

    fn failing(mut self, schema: &str) -> Self {
        self.failing.push(schema.to_uppercase());
        self
    }
}

struct MemoryConnection {
    rows: HashMap<String, Vec<Vec<Value>>>,
    delays: HashMap<String, Duration>,
    failing: Vec<String>,
    columns: Vec<String>,
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn acquire(&self) -> ConnectorResult<Box<dyn Connection>> {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryConnection {
            rows: self.rows.clone(),
            delays: self.delays.clone(),
            failing: self.failing.clone(),
            columns: self
                .columns
                .clone()
                .unwrap_or_else(|| INTROSPECTION_COLUMNS.iter().map(|c| c.to_string()).collect()),
        }))
    }

    async fn release(&self, _connection: Box<dyn Connection>) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn execute(&mut self, _sql: &str, binds: &Binds) -> ConnectorResult<ResultSet> {
        let schema = binds[SCHEMA_BIND].clone();
        if let Some(delay) = self.delays.get(&schema) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(&schema) {
            return Err(ConnectorError::Replay(format!("ORA-00942 in {}", schema)));
        }
        Ok(ResultSet {
            columns: self.columns.clone(),
            rows: self.rows.get(&schema).cloned().unwrap_or_default(),
        })
    }
}

fn row(schema: &str, object_id: u64, subprogram_id: u32, position: u32, name: &str) -> Vec<Value> {
    vec![
        json!(schema),
        json!("UTILS_PKG"),
        json!(1),
        json!("ROUTINE"),
        json!("PROCEDURE"),
        json!(object_id),
        json!(null),
        json!(subprogram_id),
        json!(name),
        json!(position),
        json!(position),
        json!(0),
        json!("NUMBER"),
        json!(null),
        json!(null),
        json!(null),
        json!("N"),
        json!("IN"),
    ]
}

fn schema_rows(schema: &str, routines: u64) -> Vec<Vec<Value>> {
    (0..routines)
        .flat_map(|r| (1..=3).map(move |p| row(schema, 1000 + r, 1, p, &format!("arg_{}", p))))
        .collect()
}

fn filter(name: &str) -> SchemaFilter {
    SchemaFilter::compile(&SchemaSettings::named(name)).unwrap()
}

fn target(name: &str, connector: Arc<dyn Connector>, schemas: &[&str]) -> DatabaseTarget {
    DatabaseTarget::new(name, connector, schemas.iter().map(|s| filter(s)).collect())
}

#[tokio::test]
async fn test_one_batch_per_schema_in_row_order() {
    let connector = Arc::new(
        MemoryConnector::default()
            .with_schema("bills", schema_rows("BILLS", 2))
            .with_schema("hr", schema_rows("HR", 1)),
    );
    let engine =
        IntrospectionEngine::new(vec![target("billing", connector.clone(), &["bills", "hr"])]);

    let mut results = engine.run().await;
    let database = results.remove(0).unwrap();

    assert_eq!(database.name, "billing");
    assert_eq!(database.schemas.len(), 2);
    let bills = database.schema("BILLS").unwrap();
    assert_eq!(bills.len(), 6);
    assert_eq!(bills.no_package_name, "BILLS_NO_PKG");
    let positions: Vec<_> = bills.rows.iter().map(|r| (r.object_id, r.position)).collect();
    assert_eq!(
        positions,
        vec![(1000, 1), (1000, 2), (1000, 3), (1001, 1), (1001, 2), (1001, 3)]
    );
    assert_eq!(connector.acquired.load(Ordering::SeqCst), 2);
    assert_eq!(connector.released.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_concurrent_matches_sequential_row_multiset() {
    let names = ["s1", "s2", "s3", "s4", "s5", "s6"];
    let mut memory = MemoryConnector::default();
    for (i, name) in names.iter().enumerate() {
        memory = memory
            .with_schema(name, schema_rows(&name.to_uppercase(), i as u64 + 1))
            .slow(name, Duration::from_millis(((names.len() - i) * 5) as u64));
    }
    let connector: Arc<MemoryConnector> = Arc::new(memory);

    let mut sequential = Vec::new();
    for name in names {
        let batch = introspect_schema(connector.as_ref(), "db", &filter(name)).await.unwrap();
        sequential.extend(batch.rows.iter().map(|r| r.to_values()));
    }

    let engine = IntrospectionEngine::new(vec![target("db", connector.clone(), &names)]);
    let database = engine.run().await.remove(0).unwrap();
    assert_eq!(database.schemas.len(), names.len());
    let mut concurrent: Vec<Vec<Value>> = database
        .schemas
        .iter()
        .flat_map(|s| s.rows.iter().map(|r| r.to_values()))
        .collect();

    let key = |values: &Vec<Value>| serde_json::to_string(values).unwrap();
    sequential.sort_by_key(key);
    concurrent.sort_by_key(key);
    assert_eq!(sequential, concurrent);
}

#[tokio::test]
async fn test_batches_arrive_in_completion_order_and_can_be_reordered() {
    let connector = Arc::new(
        MemoryConnector::default()
            .with_schema("slow", schema_rows("SLOW", 1))
            .with_schema("fast", schema_rows("FAST", 1))
            .slow("slow", Duration::from_millis(100)),
    );
    let engine = IntrospectionEngine::new(vec![target("db", connector, &["slow", "fast"])]);

    let mut database = engine.run().await.remove(0).unwrap();
    let arrival: Vec<_> = database.schemas.iter().map(|s| s.name.clone()).collect();
    assert_eq!(arrival, vec!["FAST", "SLOW"]);

    database.order_schemas(&["slow", "fast"]);
    let ordered: Vec<_> = database.schemas.iter().map(|s| s.name.clone()).collect();
    assert_eq!(ordered, vec!["SLOW", "FAST"]);
}

#[tokio::test]
async fn test_failing_schema_fails_only_its_database() {
    let broken = Arc::new(
        MemoryConnector::default()
            .with_schema("bills", schema_rows("BILLS", 1))
            .failing("hr"),
    );
    let healthy =
        Arc::new(MemoryConnector::default().with_schema("bills", schema_rows("BILLS", 1)));

    let engine = IntrospectionEngine::new(vec![
        target("broken", broken.clone(), &["bills", "hr"]),
        target("healthy", healthy, &["bills"]),
    ]);
    let results = engine.run().await;

    match &results[0] {
        Err(IntrospectionError::Connector { database, schema, .. }) => {
            assert_eq!(database, "broken");
            assert_eq!(schema, "HR");
        }
        other => panic!("expected a connector error, got {other:?}"),
    }
    let message = results[0].as_ref().unwrap_err().to_string();
    assert!(message.contains("broken.HR"));
    assert!(message.contains("ORA-00942"));

    assert_eq!(results[1].as_ref().unwrap().row_count(), 3);
    // the failed statement still returned its connection
    assert_eq!(broken.released.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_column_mismatch_is_a_row_error() {
    let mut columns: Vec<String> = INTROSPECTION_COLUMNS.iter().map(|c| c.to_string()).collect();
    columns.swap(0, 1);
    let connector = MemoryConnector {
        columns: Some(columns),
        ..MemoryConnector::default()
    }
    .with_schema("bills", schema_rows("BILLS", 1));

    let err = introspect_schema(&connector, "db", &filter("bills")).await.unwrap_err();
    assert!(matches!(err, IntrospectionError::Row { index: 0, .. }));
}

#[tokio::test]
async fn test_appendix_applied_before_returning_batch() {
    let mut settings = SchemaSettings::named("bills");
    let mut coarse = std::collections::BTreeMap::new();
    coarse.insert("data_type".to_string(), json!("pl/sql record"));
    coarse.insert("custom_type".to_string(), json!("coarse"));
    settings.appendix.push(AppendixSettings {
        comment: None,
        object_id: 1000,
        subprogram_id: 1,
        position: None,
        fields: coarse,
    });
    let mut fine = std::collections::BTreeMap::new();
    fine.insert("custom_type".to_string(), json!("bills%rowtype"));
    settings.appendix.push(AppendixSettings {
        comment: None,
        object_id: 1000,
        subprogram_id: 1,
        position: Some(2),
        fields: fine,
    });
    let filter = SchemaFilter::compile(&settings).unwrap();

    let connector = MemoryConnector::default().with_schema("bills", schema_rows("BILLS", 2));
    let batch = introspect_schema(&connector, "db", &filter).await.unwrap();

    let first = &batch.rows[0];
    assert_eq!(first.data_type.as_deref(), Some("pl/sql record"));
    assert_eq!(first.custom_type.as_deref(), Some("coarse"));
    let second = &batch.rows[1];
    assert_eq!(second.custom_type.as_deref(), Some("bills%rowtype"));
    // other routines untouched
    assert_eq!(batch.rows[3].data_type.as_deref(), Some("number"));
}
