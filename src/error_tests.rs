use super::*;

#[test]
fn sqlstate_mapping() {
    let (code, sev, msg) = AppError::not_found("temp_table_not_found", "no table").sqlstate();
    assert_eq!(code, "42P01");
    assert_eq!(sev, "ERROR");
    assert_eq!(msg, "no table");

    let (code, _, _) = AppError::conflict("table_exists", "dup").sqlstate();
    assert_eq!(code, "42P07");

    let (code, _, _) = AppError::processing("not_implicit_matview", "x").sqlstate();
    assert_eq!(code, "XX000");
}

#[test]
fn display_includes_code_and_message() {
    let e = AppError::user("row_refresh_pk", "view has no primary key");
    assert_eq!(e.to_string(), "row_refresh_pk: view has no primary key");
    assert!(e.is_usage());
    assert!(!AppError::component("load", "boom").is_usage());
}

#[test]
fn anyhow_roundtrip_keeps_app_error() {
    let original = AppError::conflict("table_exists", "Temporary table \"T\" already exists.");
    let wrapped: anyhow::Error = original.clone().into();
    let back: AppError = wrapped.into();
    assert_eq!(back, original);

    let opaque: AppError = anyhow::anyhow!("socket closed").into();
    assert_eq!(opaque.code_str(), "processing_error");
}

#[test]
fn serializes_with_type_tag() {
    let v = serde_json::to_value(AppError::metadata("group_not_found", "pm1.missing")).unwrap();
    assert_eq!(v["type"], "metadata");
    assert_eq!(v["code"], "group_not_found");
}
