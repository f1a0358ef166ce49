//! Metadata query builder.
//!
//! Assembles the per-schema introspection statement from two base queries
//! (routines inside packages, loose routines) and the schema's compiled
//! filter fragments:
//!
//! | allow-list | packaged allowed | loose allowed | emitted                               |
//! |------------|------------------|---------------|---------------------------------------|
//! | yes        | yes              | no            | with-package, allow-listed            |
//! | yes        | yes              | yes           | both, each allow-listed, `union all`  |
//! | yes        | no               | yes           | without-package, allow-listed         |
//! | no         | -                | -             | both, deny-lists where present        |
//!
//! Under an allow-list a branch with nothing allowed is left out entirely.
//! Every statement ends with the same ordering clause, which the tree
//! builder depends on.

use std::collections::BTreeMap;
use std::fmt;

use crate::filter::SchemaFilter;

/// Name reported for a function's unnamed depth-0 OUT argument.
pub const RESULT_ARGUMENT: &str = "_RESULT";

/// Bind carrying the schema (owner) name.
pub const SCHEMA_BIND: &str = "schema";

/// Bind carrying the synthetic package name of loose routines.
pub const NO_PACKAGE_BIND: &str = "no_package_name";

pub const ORDER_CLAUSE: &str = "order by package, object_id, subprogram_id, sequence, position";

const WITH_PACKAGE_SQL: &str = "\
select
    ao.owner schema,
    ao.object_name package,
    1 is_package,
    ap.procedure_name routine,
    case when exists (
        select null
        from sys.all_arguments ret
        where ret.object_id = ap.object_id
            and ret.subprogram_id = ap.subprogram_id
            and ret.argument_name is null
            and ret.data_level = 0
            and ret.in_out = 'OUT'
    ) then 'FUNCTION' else 'PROCEDURE' end routine_type,
    ap.object_id object_id,
    ap.overload overload,
    aa.subprogram_id subprogram_id,
    case when aa.argument_name is null and aa.in_out = 'OUT' and aa.data_level = 0
        then '_RESULT' else aa.argument_name end argument_name,
    aa.position position,
    aa.sequence sequence,
    aa.data_level nesting_depth,
    aa.data_type data_type,
    aa.type_owner custom_type_schema,
    aa.type_name custom_type_package,
    aa.type_subname custom_type,
    aa.defaulted is_defaulted,
    aa.in_out in_out
from sys.all_objects ao
    join sys.all_procedures ap
        on ap.owner = ao.owner and ap.object_name = ao.object_name
    join sys.all_arguments aa
        on aa.object_id = ap.object_id and aa.subprogram_id = ap.subprogram_id
where ao.object_type = 'PACKAGE'
    and ap.procedure_name is not null
    and ao.owner = :schema";

const WITHOUT_PACKAGE_SQL: &str = "\
select
    ao.owner schema,
    :no_package_name package,
    0 is_package,
    ap.object_name routine,
    ao.object_type routine_type,
    ap.object_id object_id,
    ap.overload overload,
    aa.subprogram_id subprogram_id,
    case when aa.argument_name is null and aa.in_out = 'OUT' and aa.data_level = 0
        then '_RESULT' else aa.argument_name end argument_name,
    aa.position position,
    aa.sequence sequence,
    aa.data_level nesting_depth,
    aa.data_type data_type,
    aa.type_owner custom_type_schema,
    aa.type_name custom_type_package,
    aa.type_subname custom_type,
    aa.defaulted is_defaulted,
    aa.in_out in_out
from sys.all_objects ao
    join sys.all_procedures ap
        on ap.owner = ao.owner and ap.object_name = ao.object_name
    join sys.all_arguments aa
        on aa.object_id = ap.object_id and aa.subprogram_id = ap.subprogram_id
where ao.object_type in ('FUNCTION', 'PROCEDURE')
    and ao.owner = :schema";

const PACKAGED_ROUTINE_EXPR: &str = "ao.owner || '.' || ao.object_name || '.' || ap.procedure_name";
const LOOSE_ROUTINE_EXPR: &str = "ao.owner || '.' || ap.object_name";

/// One of the two base queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryBranch {
    /// Routines declared inside packages.
    WithPackage,
    /// Standalone procedures and functions.
    WithoutPackage,
}

impl QueryBranch {
    fn base_sql(&self) -> &'static str {
        match self {
            QueryBranch::WithPackage => WITH_PACKAGE_SQL,
            QueryBranch::WithoutPackage => WITHOUT_PACKAGE_SQL,
        }
    }
}

/// A ready-to-execute introspection statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntrospectionQuery {
    /// Emitted branches, in `union all` order.
    pub branches: Vec<QueryBranch>,
    pub sql: String,
    /// Named binds (`:schema`, `:no_package_name`).
    pub binds: BTreeMap<String, String>,
}

impl fmt::Display for IntrospectionQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "-- binds: {:?}", self.binds)?;
        write!(f, "{};", self.sql)
    }
}

fn clause(expr: &str, negated: bool, fragment: &str) -> String {
    let op = if negated { "not in" } else { "in" };
    format!("    and {} {} ({})", expr, op, fragment)
}

/// Decide which branches to emit and which filter clauses each carries.
fn plan(filter: &SchemaFilter) -> Vec<(QueryBranch, Vec<String>)> {
    let fragments = filter.fragments();
    let mut branches = Vec::with_capacity(2);

    if filter.is_allow_list() {
        if !fragments.included_routines.is_empty() {
            branches.push((
                QueryBranch::WithPackage,
                vec![
                    clause("ao.object_name", false, &fragments.included_packages),
                    clause(PACKAGED_ROUTINE_EXPR, false, &fragments.included_routines),
                ],
            ));
        }
        if !fragments.included_routines_no_pkg.is_empty() {
            branches.push((
                QueryBranch::WithoutPackage,
                vec![clause(
                    "ap.object_name",
                    false,
                    &fragments.included_routines_no_pkg,
                )],
            ));
        }
        return branches;
    }

    let mut packaged = Vec::new();
    if !fragments.excluded_packages.is_empty() {
        packaged.push(clause("ao.object_name", true, &fragments.excluded_packages));
    }
    if !fragments.excluded_routines.is_empty() {
        packaged.push(clause(PACKAGED_ROUTINE_EXPR, true, &fragments.excluded_routines));
    }
    branches.push((QueryBranch::WithPackage, packaged));

    let mut loose = Vec::new();
    if !fragments.excluded_routines_no_pkg.is_empty() {
        loose.push(clause(LOOSE_ROUTINE_EXPR, true, &fragments.excluded_routines_no_pkg));
    }
    branches.push((QueryBranch::WithoutPackage, loose));

    branches
}

/// Build the introspection statement for one schema.
pub fn build_query(filter: &SchemaFilter) -> IntrospectionQuery {
    let planned = plan(filter);

    let mut binds = BTreeMap::new();
    binds.insert(SCHEMA_BIND.to_string(), filter.name().to_string());

    let mut parts = Vec::new();
    let mut branches = Vec::with_capacity(planned.len());
    for (index, (branch, clauses)) in planned.into_iter().enumerate() {
        if index > 0 {
            parts.push("union all".to_string());
        }
        parts.push(branch.base_sql().to_string());
        parts.extend(clauses);

        if branch == QueryBranch::WithoutPackage {
            binds.insert(
                NO_PACKAGE_BIND.to_string(),
                filter.no_package_name().to_string(),
            );
        }
        branches.push(branch);
    }
    parts.push(ORDER_CLAUSE.to_string());

    IntrospectionQuery {
        branches,
        sql: parts.join("\n"),
        binds,
    }
}
