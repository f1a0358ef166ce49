//! Tree reconstruction.
//!
//! Folds ordered introspection rows into a [`Database`] tree. Relies on the
//! query's ordering: rows of one schema, one package and one routine arrive
//! contiguously, and a routine's arguments arrive depth-first.
//!
//! Boundaries:
//! - a schema or package different from the last one opened starts a new
//!   node (never a search back for an earlier one);
//! - an `(object_id, subprogram_id)` different from the last row's, or a new
//!   schema/package node, starts a new routine.
//!
//! Within a routine the builder keeps the path of open structured arguments
//! (`open[d]` is the index of the open depth-`d` structured argument among
//! its siblings). A depth-`d` row truncates the path to `d` and lands among
//! the children at the end of it; a row deeper than the path allows is an
//! error, never silently re-parented.

use tracing::debug;

use super::{Argument, Database, Package, Routine, Schema};
use crate::filter::Fqdn;
use crate::introspection::{IntrospectionDatabase, IntrospectionRow, IntrospectionSchema};

pub type BuildResult<T> = Result<T, BuildError>;

/// Reconstruction errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error(
        "{fqdn}: argument at position {position} (sequence {sequence}) has nesting depth {depth}, \
         but only depth {max_depth} can be attached here"
    )]
    OrphanedArgument {
        fqdn: Fqdn,
        position: u32,
        sequence: u32,
        depth: u32,
        /// Deepest depth the open structured path accepts.
        max_depth: u32,
    },
}

/// Incremental builder for one database.
#[derive(Debug)]
pub struct TreeBuilder {
    database: Database,
    open: Vec<usize>,
    sentinel: Option<(u64, u32)>,
    rows: usize,
}

impl TreeBuilder {
    pub fn new(database: &str) -> Self {
        Self {
            database: Database::new(database),
            open: Vec::new(),
            sentinel: None,
            rows: 0,
        }
    }

    /// Fold one schema batch.
    pub fn push_batch(&mut self, batch: &IntrospectionSchema) -> BuildResult<()> {
        for row in &batch.rows {
            self.push_row(row)?;
        }
        Ok(())
    }

    /// Fold one row.
    pub fn push_row(&mut self, row: &IntrospectionRow) -> BuildResult<()> {
        self.rows += 1;

        let opened_container = self.open_containers(row);
        let key = (row.object_id, row.subprogram_id);
        if opened_container || self.sentinel != Some(key) {
            self.open_routine(row);
        }
        self.sentinel = Some(key);

        if row.is_no_argument_marker() {
            return Ok(());
        }

        let routine = self
            .database
            .schemas
            .last_mut()
            .and_then(|s| s.packages.last_mut())
            .and_then(|p| p.routines.last_mut());
        match routine {
            Some(routine) => dispatch(routine, &mut self.open, Argument::from_row(row)),
            // open_routine always leaves a routine in place
            None => Ok(()),
        }
    }

    pub fn finish(self) -> Database {
        debug!(
            database = %self.database.name,
            rows = self.rows,
            routines = self.database.routine_count(),
            "tree reconstructed"
        );
        self.database
    }

    /// Open schema/package nodes when the row leaves the current ones.
    /// Returns whether anything was opened.
    fn open_containers(&mut self, row: &IntrospectionRow) -> bool {
        let schemas = &mut self.database.schemas;
        let mut opened = false;

        if schemas.last().map(|s| s.name.as_str()) != Some(row.schema.as_str()) {
            schemas.push(Schema {
                name: row.schema.clone(),
                packages: Vec::new(),
            });
            opened = true;
        }

        if let Some(schema) = schemas.last_mut() {
            let current = schema.packages.last().map(|p| p.name.as_str());
            if opened || current != Some(row.package.as_str()) {
                schema.packages.push(Package {
                    name: row.package.clone(),
                    is_package: row.is_package,
                    routines: Vec::new(),
                });
                opened = true;
            }
        }

        opened
    }

    fn open_routine(&mut self, row: &IntrospectionRow) {
        self.open.clear();
        if let Some(package) = self
            .database
            .schemas
            .last_mut()
            .and_then(|s| s.packages.last_mut())
        {
            package.routines.push(Routine::from_row(row));
        }
    }
}

/// Attach `argument` at its depth below the open structured path.
fn dispatch(routine: &mut Routine, open: &mut Vec<usize>, argument: Argument) -> BuildResult<()> {
    let depth = argument.nesting_depth() as usize;
    let orphaned = |max_depth: usize| {
        let info = argument.info();
        BuildError::OrphanedArgument {
            fqdn: routine.fqdn.clone(),
            position: info.position,
            sequence: info.sequence,
            depth: info.nesting_depth,
            max_depth: max_depth as u32,
        }
    };

    if depth > open.len() {
        return Err(orphaned(open.len()));
    }
    open.truncate(depth);

    let mut children = &mut routine.arguments;
    for &index in open.iter() {
        children = match children.get_mut(index) {
            Some(Argument::Structured(parent)) => &mut parent.arguments,
            _ => return Err(orphaned(0)),
        };
    }

    let structured = argument.is_structured();
    children.push(argument);
    if structured {
        open.push(children.len() - 1);
    }
    Ok(())
}

/// Rebuild the tree of one database from its batches, in batch order.
pub fn build_database(introspection: &IntrospectionDatabase) -> BuildResult<Database> {
    let mut builder = TreeBuilder::new(&introspection.name);
    for batch in &introspection.schemas {
        builder.push_batch(batch)?;
    }
    Ok(builder.finish())
}
