//! Introspection: query building, fetching, and the flat row batches.
//!
//! A batch is the ordered row set of one schema; a database result collects
//! one batch per configured schema. Batches are produced concurrently by the
//! [`engine`] and consumed by the tree builder in [`crate::ir`].

mod appendix;
pub mod engine;
pub mod query;
mod row;

pub use appendix::{Appendix, AppendixKey, FieldPatch, RowPatch};
pub use engine::{
    introspect_schema, DatabaseTarget, IntrospectionEngine, IntrospectionError,
    IntrospectionResult,
};
pub use query::{build_query, IntrospectionQuery, QueryBranch};
pub use row::{InOut, IntrospectionRow, RoutineKind, RowError, RowResult, INTROSPECTION_COLUMNS};

/// Ordered rows of one schema, with appendix overrides already applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntrospectionSchema {
    /// Upper-cased schema name, as configured.
    pub name: String,
    pub no_package_name: String,
    pub rows: Vec<IntrospectionRow>,
}

impl IntrospectionSchema {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Every schema batch fetched for one database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntrospectionDatabase {
    pub name: String,
    pub schemas: Vec<IntrospectionSchema>,
}

impl IntrospectionDatabase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schemas: Vec::new(),
        }
    }

    pub fn schema(&self, name: &str) -> Option<&IntrospectionSchema> {
        self.schemas
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// Total rows across all batches.
    pub fn row_count(&self) -> usize {
        self.schemas.iter().map(IntrospectionSchema::len).sum()
    }

    /// Reorder batches to follow `order` (schema names); unlisted batches keep
    /// their relative order at the end.
    pub fn order_schemas<S: AsRef<str>>(&mut self, order: &[S]) {
        let rank = |name: &str| {
            order
                .iter()
                .position(|o| o.as_ref().eq_ignore_ascii_case(name))
                .unwrap_or(order.len())
        };
        self.schemas.sort_by_key(|s| rank(&s.name));
    }
}
