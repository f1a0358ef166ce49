use dbstubs::introspection::{InOut, IntrospectionDatabase, IntrospectionRow, RoutineKind};
use dbstubs::ir::{build_database, Argument, BuildError, TreeBuilder};
use dbstubs::Fqdn;
use serde_json::json;

/// One subprogram whose rows the tests spell out argument by argument.
struct Sub {
    schema: &'static str,
    package: &'static str,
    is_package: bool,
    routine: &'static str,
    kind: RoutineKind,
    object_id: u64,
    subprogram_id: u32,
    overload: u32,
}

impl Sub {
    fn packaged(
        package: &'static str,
        routine: &'static str,
        object_id: u64,
        subprogram_id: u32,
    ) -> Self {
        Self {
            schema: "bills",
            package,
            is_package: true,
            routine,
            kind: RoutineKind::Procedure,
            object_id,
            subprogram_id,
            overload: 0,
        }
    }

    fn loose(routine: &'static str, object_id: u64) -> Self {
        Self {
            package: "bills_no_pkg",
            is_package: false,
            ..Self::packaged("", routine, object_id, 1)
        }
    }

    fn row(
        &self,
        sequence: u32,
        position: u32,
        depth: u32,
        name: Option<&str>,
        data_type: Option<&str>,
    ) -> IntrospectionRow {
        IntrospectionRow {
            schema: self.schema.to_string(),
            package: self.package.to_string(),
            is_package: self.is_package,
            routine: self.routine.to_string(),
            routine_type: self.kind,
            object_id: self.object_id,
            overload: self.overload,
            subprogram_id: self.subprogram_id,
            argument_name: name.map(str::to_string),
            position,
            sequence,
            nesting_depth: depth,
            data_type: data_type.map(str::to_string),
            custom_type_schema: None,
            custom_type_package: None,
            custom_type: None,
            is_defaulted: false,
            in_out: InOut::In,
        }
    }

    fn arg(&self, sequence: u32, depth: u32, name: &str, data_type: &str) -> IntrospectionRow {
        self.row(sequence, sequence, depth, Some(name), Some(data_type))
    }

    fn marker(&self) -> IntrospectionRow {
        self.row(1, 1, 0, None, None)
    }
}

fn build(rows: &[IntrospectionRow]) -> Result<dbstubs::Database, BuildError> {
    let mut builder = TreeBuilder::new("BILLING");
    for row in rows {
        builder.push_row(row)?;
    }
    Ok(builder.finish())
}

fn names(arguments: &[Argument]) -> Vec<&str> {
    arguments.iter().filter_map(Argument::name).collect()
}

#[test]
fn test_payroll_routine() {
    let payroll = Sub::packaged("bill_utils_pkg", "payroll", 180000, 3);
    let mut out = payroll.arg(2, 0, "out_payroll_id", "number");
    out.in_out = InOut::Out;

    let db = build(&[payroll.arg(1, 0, "in_customer", "varchar2"), out]).unwrap();

    assert_eq!(db.name, "billing");
    assert_eq!(db.schemas.len(), 1);
    let package = &db.schemas[0].packages[0];
    assert_eq!(package.name, "bill_utils_pkg");
    assert!(package.is_package);

    let routine = &package.routines[0];
    assert_eq!(routine.fqdn, Fqdn::new("BILLS", "BILL_UTILS_PKG", "PAYROLL"));
    assert_eq!(routine.fqdn.to_string(), "BILLS.BILL_UTILS_PKG.PAYROLL");
    assert!(routine.has_ins());
    assert_eq!(names(&routine.arguments), vec!["in_customer", "out_payroll_id"]);
    assert_eq!(routine.last_argument().and_then(Argument::name), Some("out_payroll_id"));
}

#[test]
fn test_nested_members_attach_depth_first() {
    let sub = Sub::packaged("orders_pkg", "load", 200, 1);
    let rows = [
        sub.arg(1, 0, "p_rows", "table"),
        sub.row(2, 1, 1, None, Some("pl/sql record")),
        sub.arg(3, 2, "id", "number"),
        sub.arg(4, 2, "label", "varchar2"),
        sub.arg(5, 0, "p_flag", "varchar2"),
    ];
    let db = build(&rows).unwrap();
    let routine = db.routines().next().unwrap();

    assert_eq!(names(&routine.arguments), vec!["p_rows", "p_flag"]);
    let table = &routine.arguments[0];
    assert!(table.is_structured());
    assert_eq!(table.children().len(), 1);
    let record = &table.children()[0];
    assert!(record.is_structured());
    assert_eq!(record.name(), None);
    assert_eq!(names(record.children()), vec!["id", "label"]);
    assert!(record.children().iter().all(|a| a.nesting_depth() == 2));
}

#[test]
fn test_table_of_scalars() {
    let sub = Sub::packaged("orders_pkg", "ids", 201, 1);
    let rows = [
        sub.arg(1, 0, "p_ids", "table"),
        sub.row(2, 1, 1, None, Some("varchar2")),
    ];
    let db = build(&rows).unwrap();
    let table = &db.routines().next().unwrap().arguments[0];

    assert_eq!(table.children().len(), 1);
    assert!(!table.children()[0].is_structured());
}

#[test]
fn test_structural_type_without_members_stays_structured() {
    let sub = Sub::packaged("orders_pkg", "open_cursor", 202, 1);
    let rows = [
        sub.arg(1, 0, "p_cursor", "ref cursor"),
        sub.arg(2, 0, "p_limit", "number"),
    ];
    let db = build(&rows).unwrap();
    let routine = db.routines().next().unwrap();

    assert!(routine.arguments[0].is_structured());
    assert!(routine.arguments[0].children().is_empty());
    assert_eq!(routine.arguments.len(), 2);
}

#[test]
fn test_argument_deeper_than_open_path_is_orphaned() {
    let sub = Sub::packaged("orders_pkg", "broken", 203, 1);
    let rows = [
        sub.arg(1, 0, "p_id", "number"),
        sub.arg(2, 1, "member", "number"),
    ];
    let err = build(&rows).unwrap_err();

    assert_eq!(
        err,
        BuildError::OrphanedArgument {
            fqdn: Fqdn::new("bills", "orders_pkg", "broken"),
            position: 2,
            sequence: 2,
            depth: 1,
            max_depth: 0,
        }
    );
    assert!(err.to_string().starts_with("BILLS.ORDERS_PKG.BROKEN:"));

    let rows = [
        sub.arg(1, 0, "p_rows", "table"),
        sub.arg(2, 2, "id", "number"),
    ];
    let skipped = build(&rows).unwrap_err();
    assert!(matches!(skipped, BuildError::OrphanedArgument { depth: 2, max_depth: 1, .. }));
}

#[test]
fn test_scalar_closes_structured_path() {
    let sub = Sub::packaged("orders_pkg", "mixed", 204, 1);
    let rows = [
        sub.arg(1, 0, "p_rec", "record"),
        sub.arg(2, 1, "id", "number"),
        sub.arg(3, 0, "p_id", "number"),
        sub.arg(4, 1, "late", "number"),
    ];
    assert!(matches!(
        build(&rows),
        Err(BuildError::OrphanedArgument { depth: 1, max_depth: 0, .. })
    ));
}

#[test]
fn test_overloads_are_separate_routines() {
    let mut first = Sub::packaged("orders_pkg", "find", 300, 1);
    first.overload = 1;
    let mut second = Sub::packaged("orders_pkg", "find", 300, 2);
    second.overload = 2;

    let db = build(&[
        first.arg(1, 0, "p_id", "number"),
        second.arg(1, 0, "p_code", "varchar2"),
        second.arg(2, 0, "p_strict", "pl/sql boolean"),
    ])
    .unwrap();

    let routines: Vec<_> = db.routines().collect();
    assert_eq!(routines.len(), 2);
    assert_eq!(db.schemas[0].packages.len(), 1);
    assert_eq!((routines[0].overload, routines[0].subprogram_id), (1, 1));
    assert_eq!(names(&routines[0].arguments), vec!["p_id"]);
    assert_eq!(names(&routines[1].arguments), vec!["p_code", "p_strict"]);
}

#[test]
fn test_no_argument_routine() {
    let ping = Sub::loose("ping", 400);
    let db = build(&[ping.marker()]).unwrap();

    let package = &db.schemas[0].packages[0];
    assert_eq!(package.name, "bills_no_pkg");
    assert!(!package.is_package);
    let routine = &package.routines[0];
    assert!(routine.arguments.is_empty());
    assert!(!routine.has_ins());
    assert_eq!(routine.fqdn.to_string(), "BILLS.PING");
}

#[test]
fn test_functions_keep_result_argument() {
    let mut sub = Sub::loose("total", 401);
    sub.kind = RoutineKind::Function;
    let mut result = sub.row(1, 0, 0, None, Some("number"));
    result.in_out = InOut::Out;

    let db = build(&[result, sub.arg(2, 0, "p_id", "number")]).unwrap();
    let routine = db.routines().next().unwrap();

    assert_eq!(routine.kind, RoutineKind::Function);
    assert_eq!(routine.arguments.len(), 2);
    assert_eq!(routine.arguments[0].info().position, 0);
}

#[test]
fn test_containers_are_never_searched_back() {
    let a1 = Sub::packaged("a_pkg", "one", 500, 1);
    let b = Sub::packaged("b_pkg", "two", 501, 1);
    let a2 = Sub::packaged("a_pkg", "three", 500, 2);

    let db = build(&[a1.marker(), b.marker(), a2.marker()]).unwrap();
    let packages: Vec<_> = db.schemas[0].packages.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(packages, vec!["a_pkg", "b_pkg", "a_pkg"]);
}

#[test]
fn test_package_boundary_starts_new_routine() {
    // same subprogram key on both sides of the boundary
    let a = Sub::packaged("a_pkg", "same", 600, 1);
    let b = Sub::packaged("b_pkg", "same", 600, 1);

    let db = build(&[a.arg(1, 0, "x", "number"), b.arg(1, 0, "y", "number")]).unwrap();
    assert_eq!(db.routine_count(), 2);
    assert_eq!(names(&db.schemas[0].packages[1].routines[0].arguments), vec!["y"]);
}

#[test]
fn test_build_database_keeps_batch_order() {
    let bills = Sub::packaged("pkg", "r", 1, 1);
    let hr = Sub {
        schema: "hr",
        ..Sub::packaged("pkg", "r", 2, 1)
    };

    let mut introspection = IntrospectionDatabase::new("billing");
    for (name, sub) in [("HR", &hr), ("BILLS", &bills)] {
        introspection.schemas.push(dbstubs::introspection::IntrospectionSchema {
            name: name.to_string(),
            no_package_name: format!("{}_NO_PKG", name),
            rows: vec![sub.marker()],
        });
    }

    let db = build_database(&introspection).unwrap();
    let schemas: Vec<_> = db.schemas.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(schemas, vec!["hr", "bills"]);
}

#[test]
fn test_tree_serialization() {
    let sub = Sub::loose("ping", 7);
    let db = build(&[sub.arg(1, 0, "p_host", "varchar2")]).unwrap();

    assert_eq!(
        serde_json::to_value(&db).unwrap(),
        json!({
            "name": "billing",
            "schemas": [{
                "name": "bills",
                "packages": [{
                    "name": "bills_no_pkg",
                    "is_package": false,
                    "routines": [{
                        "name": "ping",
                        "kind": "procedure",
                        "object_id": 7,
                        "overload": 0,
                        "subprogram_id": 1,
                        "fqdn": "BILLS.PING",
                        "arguments": [{
                            "shape": "scalar",
                            "name": "p_host",
                            "position": 1,
                            "sequence": 1,
                            "nesting_depth": 0,
                            "data_type": "varchar2",
                            "custom_type_schema": null,
                            "custom_type_package": null,
                            "custom_type": null,
                            "defaulted": false,
                            "in_out": "in"
                        }]
                    }]
                }]
            }]
        })
    );
}
