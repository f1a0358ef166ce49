use dbstubs::config::SchemaSettings;
use dbstubs::filter::SchemaFilter;
use dbstubs::introspection::query::{NO_PACKAGE_BIND, ORDER_CLAUSE, SCHEMA_BIND};
use dbstubs::introspection::{build_query, IntrospectionQuery, QueryBranch};

fn query(configure: impl FnOnce(&mut SchemaSettings)) -> IntrospectionQuery {
    let mut settings = SchemaSettings::named("bills");
    configure(&mut settings);
    build_query(&SchemaFilter::compile(&settings).unwrap())
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[test]
fn test_allow_list_packaged_only() {
    let q = query(|s| s.include_routines = strings(&["bill_utils_pkg.payroll"]));

    assert_eq!(q.branches, vec![QueryBranch::WithPackage]);
    assert!(!q.sql.contains("union all"));
    assert!(q.sql.contains("and ao.object_name in ('BILL_UTILS_PKG')"));
    assert!(q
        .sql
        .contains("in ('BILLS.BILL_UTILS_PKG.PAYROLL')"));
    assert!(!q.binds.contains_key(NO_PACKAGE_BIND));
}

#[test]
fn test_allow_list_loose_only() {
    let q = query(|s| s.include_routines = strings(&["ping", "bills.pong"]));

    assert_eq!(q.branches, vec![QueryBranch::WithoutPackage]);
    assert!(!q.sql.contains("union all"));
    assert!(q.sql.contains("and ap.object_name in ('PING', 'PONG')"));
    assert_eq!(q.binds[NO_PACKAGE_BIND], "BILLS_NO_PKG");
}

#[test]
fn test_allow_list_both_branches() {
    let q = query(|s| s.include_routines = strings(&["bill_utils_pkg.payroll", "ping"]));

    assert_eq!(
        q.branches,
        vec![QueryBranch::WithPackage, QueryBranch::WithoutPackage]
    );
    assert_eq!(q.sql.matches("union all").count(), 1);
    assert_eq!(q.sql.matches(" not in ").count(), 0);
    assert_eq!(q.sql.matches("and ap.object_name in ('PING')").count(), 1);
}

#[test]
fn test_allow_list_ignores_excludes() {
    let q = query(|s| {
        s.include_routines = strings(&["ping"]);
        s.exclude_packages = strings(&["audit_pkg"]);
        s.exclude_routines = strings(&["pkg.routine"]);
    });

    assert!(!q.sql.contains("AUDIT_PKG"));
    assert!(!q.sql.contains(" not in "));
}

#[test]
fn test_deny_lists_filter_their_branches() {
    let q = query(|s| {
        s.exclude_packages = strings(&["audit_pkg"]);
        s.exclude_routines = strings(&["pkg.routine", "nasty"]);
    });

    assert_eq!(
        q.branches,
        vec![QueryBranch::WithPackage, QueryBranch::WithoutPackage]
    );
    let (packaged, loose) = q.sql.split_once("union all").unwrap();
    assert!(packaged.contains("and ao.object_name not in ('AUDIT_PKG')"));
    assert!(packaged.contains("not in ('BILLS.PKG.ROUTINE')"));
    assert!(!packaged.contains("BILLS.NASTY"));
    assert!(loose.contains("ao.owner || '.' || ap.object_name not in ('BILLS.NASTY')"));
    assert!(!loose.contains("AUDIT_PKG"));
}

#[test]
fn test_no_filters_unions_unfiltered_branches() {
    let q = query(|_| {});

    assert_eq!(q.branches.len(), 2);
    assert!(!q.sql.contains(" not in "));
    // only the object type restriction of the loose branch
    assert_eq!(q.sql.lines().filter(|l| l.contains(" in (")).count(), 1);
}

#[test]
fn test_every_query_ends_with_fixed_ordering() {
    for q in [
        query(|_| {}),
        query(|s| s.include_routines = strings(&["ping"])),
        query(|s| s.include_routines = strings(&["pkg.r"])),
    ] {
        assert!(q.sql.ends_with(ORDER_CLAUSE));
        assert_eq!(q.sql.matches("order by").count(), 1);
        assert_eq!(q.binds[SCHEMA_BIND], "BILLS");
    }
}

#[test]
fn test_display_includes_binds_and_terminator() {
    let rendered = query(|_| {}).to_string();
    assert!(rendered.starts_with("-- binds: "));
    assert!(rendered.ends_with(';'));
}
