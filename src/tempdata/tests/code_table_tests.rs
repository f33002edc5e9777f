use serde_json::json;

use super::fixtures::*;
use crate::error::AppError;
use crate::storage::MatState;

const DESCR_TABLE: &str = "#CODE_PM1.CODES.CODE.DESCR";

fn seed_codes(h: &Harness) {
    h.source.set_rows(DESCR_TABLE, vec![vec![json!(1), json!("one")], vec![json!(2), json!("two")]]);
    h.source.set_rows("#CODE_PM1.CODES.CODE.LANG", vec![vec![json!(1), json!("en")], vec![json!(2), json!("fr")]]);
}

#[test]
fn lookup_declares_and_loads_once() {
    let h = Harness::new();
    seed_codes(&h);
    assert_eq!(h.dm.lookup_code_value(&h.ctx, "pm1.codes", "descr", "code", json!(2)).unwrap(), Some(json!("two")));
    assert_eq!(h.dm.lookup_code_value(&h.ctx, "PM1.CODES", "DESCR", "CODE", json!(1)).unwrap(), Some(json!("one")));
    assert_eq!(h.source.calls_named(DESCR_TABLE), 1);
    assert_eq!(h.source.last_sql().as_deref(), Some("SELECT code ,descr FROM pm1.codes"));

    let group = h.ctx.global_store.get_temp_group(DESCR_TABLE).unwrap();
    assert_eq!(group.primary_key, vec!["code".to_string()]);
    assert!(group.cache_hint.as_ref().unwrap().prefers_memory);
    assert_eq!(h.ctx.global_store.get_mat_table_info(DESCR_TABLE).state(), MatState::Loaded);
}

#[test]
fn missing_key_yields_none() {
    let h = Harness::new();
    seed_codes(&h);
    assert_eq!(h.dm.lookup_code_value(&h.ctx, "pm1.codes", "descr", "code", json!(99)).unwrap(), None);
}

#[test]
fn each_return_column_gets_its_own_table() {
    let h = Harness::new();
    seed_codes(&h);
    assert_eq!(h.dm.lookup_code_value(&h.ctx, "pm1.codes", "lang", "code", json!(2)).unwrap(), Some(json!("fr")));
    assert_eq!(h.dm.lookup_code_value(&h.ctx, "pm1.codes", "descr", "code", json!(2)).unwrap(), Some(json!("two")));
    let mut names = h.ctx.global_store.table_names();
    names.sort();
    assert_eq!(names, vec![DESCR_TABLE.to_string(), "#CODE_PM1.CODES.CODE.LANG".to_string()]);
}

#[test]
fn unknown_column_is_a_metadata_error() {
    let h = Harness::new();
    let err = h.dm.lookup_code_value(&h.ctx, "pm1.codes", "nope", "code", json!(1)).unwrap_err();
    assert!(matches!(err, AppError::Metadata { .. }));
    assert!(h.ctx.global_store.get_temp_group("#CODE_PM1.CODES.CODE.NOPE").is_none());
}

#[test]
fn failed_code_load_propagates() {
    let h = Harness::new();
    seed_codes(&h);
    h.source.failing.store(true, std::sync::atomic::Ordering::SeqCst);
    assert!(h.dm.lookup_code_value(&h.ctx, "pm1.codes", "descr", "code", json!(1)).is_err());
    h.source.failing.store(false, std::sync::atomic::Ordering::SeqCst);
    assert_eq!(h.dm.lookup_code_value(&h.ctx, "pm1.codes", "descr", "code", json!(1)).unwrap(), Some(json!("one")));
    // the group was declared by the first attempt only
    assert!(h.ctx.global_store.get_temp_group(DESCR_TABLE).is_some());
}
