use serde_json::json;

use super::fixtures::*;
use crate::command::{Command, CompOp, Criteria, Drop, Expr, GroupSymbol, Insert, InsertSource, Query, StoredProcedure, Update, ArithOp};
use crate::error::AppError;
use crate::tempdata::ProcessorDataManager;

#[test]
fn create_insert_select_returns_every_row() {
    let h = Harness::new();
    assert_eq!(h.update_count(create_t("#t")).unwrap(), 0);
    assert_eq!(h.update_count(insert_rows("#t", v1_rows(5))).unwrap(), 5);
    let rows = h.run(Command::Query(Query::select_all(GroupSymbol::temp("#t")))).unwrap();
    assert_eq!(rows.len(), 5);
    assert!(h.pass.seen.lock().is_empty());
}

#[test]
fn create_existing_table_conflicts() {
    let h = Harness::new();
    h.update_count(create_t("#t")).unwrap();
    let err = h.update_count(create_t("#T")).unwrap_err();
    assert!(matches!(err, AppError::Conflict { .. }));
    assert_eq!(err.code_str(), "table_exist_error");
}

#[test]
fn first_insert_defines_table() {
    let h = Harness::new();
    let insert = Command::Insert(Insert {
        group: GroupSymbol::temp("#auto"),
        columns: vec!["a".into(), "b".into()],
        source: InsertSource::Values(vec![
            Expr::Arith { left: Box::new(Expr::val(40)), op: ArithOp::Add, right: Box::new(Expr::val(2)) },
            Expr::val("x"),
        ]),
    });
    assert_eq!(h.update_count(insert).unwrap(), 1);
    let rows = h.run(Command::Query(Query::select(GroupSymbol::temp("#auto"), vec![Expr::col("b"), Expr::col("a")]))).unwrap();
    assert_eq!(rows, vec![vec![json!("x"), json!(42)]]);
}

#[test]
fn dropped_table_is_never_served() {
    let h = Harness::new();
    h.update_count(create_t("#t")).unwrap();
    h.update_count(insert_rows("#t", v1_rows(2))).unwrap();
    assert_eq!(h.update_count(Command::Drop(Drop { table: GroupSymbol::temp("#t") })).unwrap(), 0);
    let err = h.run(Command::Query(Query::select_all(GroupSymbol::temp("#t")))).unwrap_err();
    assert!(matches!(err, AppError::NotFound { .. }));
    // dropping again is not an error
    assert_eq!(h.update_count(Command::Drop(Drop { table: GroupSymbol::temp("#t") })).unwrap(), 0);
    // re-created table starts empty
    h.update_count(create_t("#t")).unwrap();
    assert!(h.run(Command::Query(Query::select_all(GroupSymbol::temp("#t")))).unwrap().is_empty());
}

#[test]
fn delete_without_criteria_truncates() {
    let h = Harness::new();
    h.update_count(create_t("#t")).unwrap();
    h.update_count(insert_rows("#t", v1_rows(7))).unwrap();
    assert_eq!(h.update_count(delete_all("#t")).unwrap(), 7);
    assert!(h.run(Command::Query(Query::select_all(GroupSymbol::temp("#t")))).unwrap().is_empty());
}

#[test]
fn update_and_filtered_delete_report_counts() {
    let h = Harness::new();
    h.update_count(create_t("#t")).unwrap();
    h.update_count(insert_rows("#t", v1_rows(4))).unwrap();
    let upd = Command::Update(Update {
        group: GroupSymbol::temp("#t"),
        changes: vec![("name".into(), Expr::val("big"))],
        criteria: Some(Criteria::compare(Expr::col("id"), CompOp::Gt, Expr::val(2))),
    });
    assert_eq!(h.update_count(upd).unwrap(), 2);
    let del = Command::Delete(crate::command::Delete { group: GroupSymbol::temp("#t"), criteria: Some(Criteria::eq("name", "big")) });
    assert_eq!(h.update_count(del).unwrap(), 2);
    let rows = h.run(Command::Query(Query::select(GroupSymbol::temp("#t"), vec![Expr::col("id")]).with_order_by(Expr::col("id"), false))).unwrap();
    assert_eq!(rows, vec![vec![json!(2)], vec![json!(1)]]);
}

#[test]
fn aliased_query_is_remapped_to_table_name() {
    let h = Harness::new();
    h.update_count(create_t("#t")).unwrap();
    h.update_count(insert_rows("#t", v1_rows(3))).unwrap();
    let q = Query::select(GroupSymbol::temp("#t").aliased("x"), vec![Expr::col("x.name")])
        .with_criteria(Criteria::compare(Expr::col("x.id"), CompOp::Ge, Expr::val(2)))
        .with_order_by(Expr::col("x.id"), false);
    let rows = h.run(Command::Query(q)).unwrap();
    assert_eq!(rows, vec![vec![json!("name3")], vec![json!("name2")]]);
}

#[test]
fn non_temp_commands_pass_through_unchanged() {
    let h = Harness::new();
    let q = Command::Query(Query::select_all(GroupSymbol::physical("pm1.g1")));
    let mut ts = h.dm.register_request(&h.ctx, q.clone(), "pm1", Some("b1"), 7).unwrap();
    assert_eq!(ts.collect_rows().unwrap(), vec![vec![json!("passed")]]);
    let seen = h.pass.seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0], (q, "pm1".to_string(), Some("b1".to_string()), 7));
}

#[test]
fn procedures_outside_system_model_pass_through() {
    let h = Harness::new();
    h.run_in("pm1", refresh_cmd(V1, false)).unwrap();
    let other = Command::StoredProcedure(StoredProcedure { name: "SYS.getXMLSchemas".into(), params: vec![] });
    h.run_in("sys", other).unwrap();
    assert_eq!(h.pass.seen.lock().len(), 2);
    assert_eq!(h.source.calls_named(V1_MAT), 0);
}

#[test]
fn system_model_match_ignores_case() {
    let h = Harness::new();
    let rows = h.run_in("sys", refresh_cmd(V1, false)).unwrap();
    assert_eq!(rows, vec![vec![json!(3)]]);
    assert!(h.pass.seen.lock().is_empty());
}

#[test]
fn writes_to_global_tables_are_rejected() {
    let h = Harness::new();
    let insert = Command::Insert(Insert { group: GroupSymbol::global(V1_MAT), columns: vec!["id".into()], source: InsertSource::Rows(vec![vec![json!(1)]]) });
    let err = h.update_count(insert).unwrap_err();
    assert_eq!(err.code_str(), "global_table_not_updatable");
}

#[test]
fn temp_access_without_session_is_an_error() {
    let h = Harness::new();
    let mut ctx = h.ctx.clone();
    ctx.temp_store = None;
    let err = match h.dm.register_request(&ctx, create_t("#t"), "pm1", None, 0) {
        Ok(_) => panic!("create without a session store should fail"),
        Err(e) => e,
    };
    assert!(err.is_usage());
}

#[test]
fn child_scope_writes_through_to_session_tables() {
    let h = Harness::new();
    h.update_count(create_t("#t")).unwrap();
    let child = h.mgr.open_child_scope(&h.ctx, "proc");
    let mut ts = h.dm.register_request(&child, insert_rows("#t", v1_rows(2)), "pm1", None, 0).unwrap();
    assert_eq!(crate::tuple::read_update_count(ts.as_mut()).unwrap(), Some(2));
    assert_eq!(h.run(Command::Query(Query::select_all(GroupSymbol::temp("#t")))).unwrap().len(), 2);
}
