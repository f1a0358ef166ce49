//! Manual metadata corrections ("appendix overrides").
//!
//! Some structured-type metadata is reported incompletely by the data
//! dictionary, so it is supplied by hand and patched onto fetched rows
//! before the tree is rebuilt. A patch is keyed either by subprogram
//! `(object_id, subprogram_id)` or by argument
//! `(object_id, subprogram_id, position)`; the subprogram patch is applied
//! first, so argument patches win on any field both touch.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde_json::Value;

use super::row::{
    flag, in_out, integer, optional_string, required_string, routine_kind, InOut, IntrospectionRow,
    RoutineKind, RowError, RowResult, INTROSPECTION_COLUMNS,
};

/// Subprogram-wide (`position == None`) or argument-specific key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AppendixKey {
    pub object_id: u64,
    pub subprogram_id: u32,
    pub position: Option<u32>,
}

impl AppendixKey {
    pub fn new(object_id: u64, subprogram_id: u32, position: Option<u32>) -> Self {
        Self {
            object_id,
            subprogram_id,
            position,
        }
    }

    pub fn subprogram(object_id: u64, subprogram_id: u32) -> Self {
        Self::new(object_id, subprogram_id, None)
    }

    pub fn argument(object_id: u64, subprogram_id: u32, position: u32) -> Self {
        Self::new(object_id, subprogram_id, Some(position))
    }
}

impl fmt::Display for AppendixKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(position) => write!(
                f,
                "({}, {}, {})",
                self.object_id, self.subprogram_id, position
            ),
            None => write!(f, "({}, {})", self.object_id, self.subprogram_id),
        }
    }
}

/// A single typed field replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldPatch {
    Schema(String),
    Package(String),
    IsPackage(bool),
    Routine(String),
    RoutineType(RoutineKind),
    Overload(u32),
    ArgumentName(Option<String>),
    Sequence(u32),
    NestingDepth(u32),
    DataType(Option<String>),
    CustomTypeSchema(Option<String>),
    CustomTypePackage(Option<String>),
    CustomType(Option<String>),
    IsDefaulted(bool),
    InOut(InOut),
}

impl FieldPatch {
    /// Decode a replacement value for the named row field.
    pub fn decode(field: &str, value: &Value) -> RowResult<Self> {
        let column = INTROSPECTION_COLUMNS
            .iter()
            .find(|c| c.eq_ignore_ascii_case(field))
            .copied()
            .ok_or_else(|| RowError::UnknownColumn(field.to_string()))?;
        let cell = (column, value);

        Ok(match column {
            "schema" => FieldPatch::Schema(required_string(cell)?),
            "package" => FieldPatch::Package(required_string(cell)?),
            "is_package" => FieldPatch::IsPackage(flag(cell)?),
            "routine" => FieldPatch::Routine(required_string(cell)?),
            "routine_type" => FieldPatch::RoutineType(routine_kind(cell)?),
            "overload" => FieldPatch::Overload(integer(cell)?),
            "argument_name" => FieldPatch::ArgumentName(optional_string(cell)?),
            "sequence" => FieldPatch::Sequence(integer(cell)?),
            "nesting_depth" => FieldPatch::NestingDepth(integer(cell)?),
            "data_type" => FieldPatch::DataType(optional_string(cell)?),
            "custom_type_schema" => FieldPatch::CustomTypeSchema(optional_string(cell)?),
            "custom_type_package" => FieldPatch::CustomTypePackage(optional_string(cell)?),
            "custom_type" => FieldPatch::CustomType(optional_string(cell)?),
            "is_defaulted" => FieldPatch::IsDefaulted(flag(cell)?),
            "in_out" => FieldPatch::InOut(in_out(cell)?),
            key => return Err(RowError::KeyColumn(key.to_string())),
        })
    }

    fn apply(&self, row: &mut IntrospectionRow) {
        match self {
            FieldPatch::Schema(v) => row.schema = v.clone(),
            FieldPatch::Package(v) => row.package = v.clone(),
            FieldPatch::IsPackage(v) => row.is_package = *v,
            FieldPatch::Routine(v) => row.routine = v.clone(),
            FieldPatch::RoutineType(v) => row.routine_type = *v,
            FieldPatch::Overload(v) => row.overload = *v,
            FieldPatch::ArgumentName(v) => row.argument_name = v.clone(),
            FieldPatch::Sequence(v) => row.sequence = *v,
            FieldPatch::NestingDepth(v) => row.nesting_depth = *v,
            FieldPatch::DataType(v) => row.data_type = v.clone(),
            FieldPatch::CustomTypeSchema(v) => row.custom_type_schema = v.clone(),
            FieldPatch::CustomTypePackage(v) => row.custom_type_package = v.clone(),
            FieldPatch::CustomType(v) => row.custom_type = v.clone(),
            FieldPatch::IsDefaulted(v) => row.is_defaulted = *v,
            FieldPatch::InOut(v) => row.in_out = *v,
        }
    }

    /// Discriminant used to merge patches field by field.
    fn field(&self) -> std::mem::Discriminant<Self> {
        std::mem::discriminant(self)
    }
}

/// The set of field replacements for one appendix key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowPatch {
    pub comment: Option<String>,
    pub fields: Vec<FieldPatch>,
}

impl RowPatch {
    pub fn decode(comment: Option<String>, fields: &BTreeMap<String, Value>) -> RowResult<Self> {
        let fields = fields
            .iter()
            .map(|(field, value)| FieldPatch::decode(field, value))
            .collect::<RowResult<Vec<_>>>()?;
        Ok(Self { comment, fields })
    }

    /// Fold `other` into `self`; `other` wins on shared fields.
    fn merge(&mut self, other: RowPatch) {
        for patch in other.fields {
            match self.fields.iter().position(|p| p.field() == patch.field()) {
                Some(index) => self.fields[index] = patch,
                None => self.fields.push(patch),
            }
        }
        if other.comment.is_some() {
            self.comment = other.comment;
        }
    }

    pub fn apply(&self, row: &mut IntrospectionRow) {
        for patch in &self.fields {
            patch.apply(row);
        }
    }
}

/// Compiled appendix for one schema.
#[derive(Debug, Clone, Default)]
pub struct Appendix {
    entries: HashMap<AppendixKey, RowPatch>,
}

impl Appendix {
    /// Add a patch; patches sharing a key merge, the later one winning per field.
    pub fn insert(&mut self, key: AppendixKey, patch: RowPatch) {
        match self.entries.entry(key) {
            Entry::Occupied(mut existing) => existing.get_mut().merge(patch),
            Entry::Vacant(slot) => {
                slot.insert(patch);
            }
        }
    }

    pub fn get(&self, key: &AppendixKey) -> Option<&RowPatch> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Patch a fetched row. Returns the number of patches applied (0..=2).
    pub fn apply(&self, row: &mut IntrospectionRow) -> usize {
        if self.entries.is_empty() {
            return 0;
        }

        let subprogram = AppendixKey::subprogram(row.object_id, row.subprogram_id);
        let argument = AppendixKey::argument(row.object_id, row.subprogram_id, row.position);

        let mut applied = 0;
        for key in [subprogram, argument] {
            if let Some(patch) = self.entries.get(&key) {
                patch.apply(row);
                applied += 1;
            }
        }
        applied
    }
}
