//! # dbstubs
//!
//! Introspects stored routine metadata (procedures and functions, optionally
//! grouped into packages) and rebuilds the flat metadata rows into a typed
//! routine/argument tree that emitters serialize.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │            Settings (dbstubs.toml, per schema)           │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [filter]
//! ┌─────────────────────────────────────────────────────────┐
//! │       SchemaFilter (FQDNs, SQL fragments, appendix)      │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [introspection::query]
//! ┌─────────────────────────────────────────────────────────┐
//! │          IntrospectionQuery (SQL text + binds)           │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [introspection::engine + connector]
//! ┌─────────────────────────────────────────────────────────┐
//! │   IntrospectionDatabase (one ordered batch per schema)   │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [ir::builder]
//! ┌─────────────────────────────────────────────────────────┐
//! │  Database → Schema → Package → Routine → Argument tree   │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [emit]
//!                  json / raw-introspection
//! ```

pub mod config;
pub mod connector;
pub mod emit;
pub mod filter;
pub mod introspection;
pub mod ir;
pub mod pipeline;
pub mod worker;

pub use filter::{Fqdn, SchemaFilter};
pub use introspection::{IntrospectionDatabase, IntrospectionRow, IntrospectionSchema};
pub use ir::{Argument, Database, Routine};
