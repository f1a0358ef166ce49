//! Reconstructed routine tree.
//!
//! ```text
//! Database ─► Schema ─► Package ─► Routine ─► Argument
//!                                               └─► Argument (structured types nest)
//! ```
//!
//! Built once per run by [`builder::TreeBuilder`] from ordered introspection
//! rows and handed read-only to emitters.

use serde::Serialize;

use crate::filter::Fqdn;
use crate::introspection::{InOut, IntrospectionRow, RoutineKind};

pub mod builder;

pub use builder::{build_database, BuildError, BuildResult, TreeBuilder};

/// Data types whose values are composed of nested members.
pub const STRUCTURAL_TYPES: [&str; 7] = [
    "ref cursor",
    "object",
    "varray",
    "table",
    "record",
    "pl/sql table",
    "pl/sql record",
];

/// Whether `data_type` is one of [`STRUCTURAL_TYPES`] (case-insensitive).
pub fn is_structural(data_type: &str) -> bool {
    STRUCTURAL_TYPES
        .iter()
        .any(|t| t.eq_ignore_ascii_case(data_type.trim()))
}

/// Fields shared by scalar and structured arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArgumentInfo {
    pub name: Option<String>,
    pub position: u32,
    pub sequence: u32,
    pub nesting_depth: u32,
    pub data_type: Option<String>,
    pub custom_type_schema: Option<String>,
    pub custom_type_package: Option<String>,
    pub custom_type: Option<String>,
    pub defaulted: bool,
    pub in_out: InOut,
}

impl ArgumentInfo {
    pub fn from_row(row: &IntrospectionRow) -> Self {
        Self {
            name: row.argument_name.clone(),
            position: row.position,
            sequence: row.sequence,
            nesting_depth: row.nesting_depth,
            data_type: row.data_type.clone(),
            custom_type_schema: row.custom_type_schema.clone(),
            custom_type_package: row.custom_type_package.clone(),
            custom_type: row.custom_type.clone(),
            defaulted: row.is_defaulted,
            in_out: row.in_out,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructuredArgument {
    #[serde(flatten)]
    pub info: ArgumentInfo,
    /// Members, each one level deeper than this argument.
    pub arguments: Vec<Argument>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Argument {
    Scalar(ArgumentInfo),
    Structured(StructuredArgument),
}

impl Argument {
    /// Scalar or structured, by the row's data type.
    pub fn from_row(row: &IntrospectionRow) -> Self {
        let info = ArgumentInfo::from_row(row);
        match row.data_type.as_deref() {
            Some(data_type) if is_structural(data_type) => Argument::Structured(StructuredArgument {
                info,
                arguments: Vec::new(),
            }),
            _ => Argument::Scalar(info),
        }
    }

    pub fn info(&self) -> &ArgumentInfo {
        match self {
            Argument::Scalar(info) => info,
            Argument::Structured(structured) => &structured.info,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.info().name.as_deref()
    }

    pub fn nesting_depth(&self) -> u32 {
        self.info().nesting_depth
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, Argument::Structured(_))
    }

    /// Nested members; empty for scalars.
    pub fn children(&self) -> &[Argument] {
        match self {
            Argument::Scalar(_) => &[],
            Argument::Structured(structured) => &structured.arguments,
        }
    }

    /// Dotted `schema.package.type` of a custom type, skipping empty parts.
    pub fn custom_type_fqdn(&self) -> String {
        let info = self.info();
        [
            &info.custom_type_schema,
            &info.custom_type_package,
            &info.custom_type,
        ]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(".")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Routine {
    pub name: String,
    pub kind: RoutineKind,
    pub object_id: u64,
    /// 0 when not overloaded.
    pub overload: u32,
    pub subprogram_id: u32,
    pub fqdn: Fqdn,
    pub arguments: Vec<Argument>,
}

impl Routine {
    pub fn from_row(row: &IntrospectionRow) -> Self {
        let package = if row.is_package { row.package.as_str() } else { "" };
        Self {
            name: row.routine.clone(),
            kind: row.routine_type,
            object_id: row.object_id,
            overload: row.overload,
            subprogram_id: row.subprogram_id,
            fqdn: Fqdn::new(&row.schema, package, &row.routine),
            arguments: Vec::new(),
        }
    }

    /// Takes at least one `IN` or `IN/OUT` argument.
    pub fn has_ins(&self) -> bool {
        self.arguments
            .iter()
            .any(|a| a.info().in_out != InOut::Out)
    }

    pub fn last_argument(&self) -> Option<&Argument> {
        self.arguments.last()
    }

    /// Arguments with defaulted ones moved to the end, otherwise in order.
    pub fn sorted_arguments(&self) -> Vec<&Argument> {
        let mut sorted: Vec<&Argument> = self.arguments.iter().collect();
        sorted.sort_by_key(|a| a.info().defaulted);
        sorted
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Package {
    pub name: String,
    /// `false` for the synthetic bucket of loose routines.
    pub is_package: bool,
    pub routines: Vec<Routine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schema {
    pub name: String,
    pub packages: Vec<Package>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Database {
    pub name: String,
    pub schemas: Vec<Schema>,
}

impl Database {
    /// Name is lower-cased.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_lowercase(),
            schemas: Vec::new(),
        }
    }

    pub fn routines(&self) -> impl Iterator<Item = &Routine> {
        self.schemas
            .iter()
            .flat_map(|s| &s.packages)
            .flat_map(|p| &p.routines)
    }

    pub fn routine_count(&self) -> usize {
        self.routines().count()
    }
}
