//! Fixed-shape introspection rows.
//!
//! The connector hands back positional values; [`IntrospectionRow::from_values`]
//! checks them against [`INTROSPECTION_COLUMNS`] before decoding, so a query
//! and a row type that drift apart fail loudly instead of mis-assigning fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Column order every introspection query selects, and every row decodes.
pub const INTROSPECTION_COLUMNS: [&str; 18] = [
    "schema",
    "package",
    "is_package",
    "routine",
    "routine_type",
    "object_id",
    "overload",
    "subprogram_id",
    "argument_name",
    "position",
    "sequence",
    "nesting_depth",
    "data_type",
    "custom_type_schema",
    "custom_type_package",
    "custom_type",
    "is_defaulted",
    "in_out",
];

/// Errors decoding a row or a row patch.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RowError {
    #[error("expected {expected} columns, got {actual}")]
    ColumnCount { expected: usize, actual: usize },

    #[error("column {index} is '{actual}', expected '{expected}'")]
    ColumnOrder {
        index: usize,
        expected: &'static str,
        actual: String,
    },

    #[error("column '{column}': {reason}")]
    InvalidValue { column: String, reason: String },

    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    #[error("column '{0}' identifies the row and cannot be overridden")]
    KeyColumn(String),
}

pub type RowResult<T> = Result<T, RowError>;

/// Procedure or function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutineKind {
    Function,
    Procedure,
}

impl RoutineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutineKind::Function => "FUNCTION",
            RoutineKind::Procedure => "PROCEDURE",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "FUNCTION" => Some(RoutineKind::Function),
            "PROCEDURE" => Some(RoutineKind::Procedure),
            _ => None,
        }
    }
}

/// Argument direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InOut {
    #[serde(rename = "in")]
    In,
    #[serde(rename = "out")]
    Out,
    #[serde(rename = "in/out")]
    InOut,
}

impl InOut {
    pub fn as_str(&self) -> &'static str {
        match self {
            InOut::In => "IN",
            InOut::Out => "OUT",
            InOut::InOut => "IN/OUT",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "IN" => Some(InOut::In),
            "OUT" => Some(InOut::Out),
            "IN/OUT" | "IN OUT" => Some(InOut::InOut),
            _ => None,
        }
    }
}

/// One (routine, argument) metadata row at any nesting depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntrospectionRow {
    pub schema: String,
    pub package: String,
    pub is_package: bool,
    pub routine: String,
    pub routine_type: RoutineKind,
    pub object_id: u64,
    /// 0 when the routine is not overloaded.
    pub overload: u32,
    pub subprogram_id: u32,
    /// Absent for collection elements and for the no-argument marker row.
    pub argument_name: Option<String>,
    pub position: u32,
    pub sequence: u32,
    pub nesting_depth: u32,
    pub data_type: Option<String>,
    pub custom_type_schema: Option<String>,
    pub custom_type_package: Option<String>,
    pub custom_type: Option<String>,
    pub is_defaulted: bool,
    pub in_out: InOut,
}

impl IntrospectionRow {
    /// Decode a positional row. String columns are lower-cased.
    pub fn from_values(columns: &[String], values: &[Value]) -> RowResult<Self> {
        check_columns(columns)?;
        if values.len() != INTROSPECTION_COLUMNS.len() {
            return Err(RowError::ColumnCount {
                expected: INTROSPECTION_COLUMNS.len(),
                actual: values.len(),
            });
        }

        let v = |index: usize| (INTROSPECTION_COLUMNS[index], &values[index]);

        let mut row = Self {
            schema: required_string(v(0))?,
            package: required_string(v(1))?,
            is_package: flag(v(2))?,
            routine: required_string(v(3))?,
            routine_type: routine_kind(v(4))?,
            object_id: integer(v(5))?,
            overload: optional_integer(v(6))?.unwrap_or(0),
            subprogram_id: integer(v(7))?,
            argument_name: optional_string(v(8))?,
            position: optional_integer(v(9))?.unwrap_or(0),
            sequence: integer(v(10))?,
            nesting_depth: integer(v(11))?,
            data_type: optional_string(v(12))?,
            custom_type_schema: optional_string(v(13))?,
            custom_type_package: optional_string(v(14))?,
            custom_type: optional_string(v(15))?,
            is_defaulted: flag(v(16))?,
            in_out: in_out(v(17))?,
        };
        row.lowercase();
        Ok(row)
    }

    /// Positional values in [`INTROSPECTION_COLUMNS`] order.
    pub fn to_values(&self) -> Vec<Value> {
        let opt = |s: &Option<String>| s.clone().map(Value::String).unwrap_or(Value::Null);
        vec![
            Value::from(self.schema.clone()),
            Value::from(self.package.clone()),
            Value::from(u8::from(self.is_package)),
            Value::from(self.routine.clone()),
            Value::from(self.routine_type.as_str()),
            Value::from(self.object_id),
            Value::from(self.overload),
            Value::from(self.subprogram_id),
            opt(&self.argument_name),
            Value::from(self.position),
            Value::from(self.sequence),
            Value::from(self.nesting_depth),
            opt(&self.data_type),
            opt(&self.custom_type_schema),
            opt(&self.custom_type_package),
            opt(&self.custom_type),
            Value::from(if self.is_defaulted { "Y" } else { "N" }),
            Value::from(self.in_out.as_str()),
        ]
    }

    /// A depth-0 row with neither name nor type: the routine takes no arguments.
    pub fn is_no_argument_marker(&self) -> bool {
        self.nesting_depth == 0 && self.argument_name.is_none() && self.data_type.is_none()
    }

    fn lowercase(&mut self) {
        for s in [&mut self.schema, &mut self.package, &mut self.routine] {
            *s = s.to_lowercase();
        }
        for s in [
            &mut self.argument_name,
            &mut self.data_type,
            &mut self.custom_type_schema,
            &mut self.custom_type_package,
            &mut self.custom_type,
        ]
        .into_iter()
        .flatten()
        {
            *s = s.to_lowercase();
        }
    }
}

fn check_columns(columns: &[String]) -> RowResult<()> {
    if columns.len() != INTROSPECTION_COLUMNS.len() {
        return Err(RowError::ColumnCount {
            expected: INTROSPECTION_COLUMNS.len(),
            actual: columns.len(),
        });
    }
    for (index, (actual, expected)) in columns.iter().zip(INTROSPECTION_COLUMNS).enumerate() {
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(RowError::ColumnOrder {
                index,
                expected,
                actual: actual.clone(),
            });
        }
    }
    Ok(())
}

// ============================================================================
// Value decoders (shared with appendix patches)
// ============================================================================

type Cell<'a> = (&'a str, &'a Value);

fn invalid(column: &str, reason: impl Into<String>) -> RowError {
    RowError::InvalidValue {
        column: column.to_string(),
        reason: reason.into(),
    }
}

pub(crate) fn optional_string((column, value): Cell<'_>) -> RowResult<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(invalid(column, format!("expected a string, got {}", other))),
    }
}

pub(crate) fn required_string(cell: Cell<'_>) -> RowResult<String> {
    optional_string(cell)?.ok_or_else(|| invalid(cell.0, "must not be null"))
}

pub(crate) fn optional_integer<T: TryFrom<u64>>((column, value): Cell<'_>) -> RowResult<Option<T>> {
    let raw = match value {
        Value::Null => return Ok(None),
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| invalid(column, format!("expected a non-negative integer, got {}", n)))?,
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| invalid(column, format!("expected a non-negative integer, got '{}'", s)))?,
        other => return Err(invalid(column, format!("expected an integer, got {}", other))),
    };
    T::try_from(raw)
        .map(Some)
        .map_err(|_| invalid(column, format!("{} is out of range", raw)))
}

pub(crate) fn integer<T: TryFrom<u64>>(cell: Cell<'_>) -> RowResult<T> {
    optional_integer(cell)?.ok_or_else(|| invalid(cell.0, "must not be null"))
}

/// `1`/`0`, `true`/`false`, or `Y`/`N`; null is false.
pub(crate) fn flag((column, value): Cell<'_>) -> RowResult<bool> {
    match value {
        Value::Null => Ok(false),
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => match n.as_u64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(invalid(column, format!("expected 0 or 1, got {}", n))),
        },
        Value::String(s) => match s.to_uppercase().as_str() {
            "Y" | "1" | "TRUE" => Ok(true),
            "N" | "0" | "FALSE" => Ok(false),
            _ => Err(invalid(column, format!("expected Y or N, got '{}'", s))),
        },
        other => Err(invalid(column, format!("expected a flag, got {}", other))),
    }
}

pub(crate) fn routine_kind(cell: Cell<'_>) -> RowResult<RoutineKind> {
    let s = required_string(cell)?;
    RoutineKind::parse(&s).ok_or_else(|| invalid(cell.0, format!("unknown routine type '{}'", s)))
}

pub(crate) fn in_out(cell: Cell<'_>) -> RowResult<InOut> {
    let s = required_string(cell)?;
    InOut::parse(&s).ok_or_else(|| invalid(cell.0, format!("unknown direction '{}'", s)))
}
