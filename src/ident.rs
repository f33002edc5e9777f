//! Identifier helpers
//! -----------------
//! Single source of truth for canonical table names, element qualification
//! and the reserved prefixes used for materialized and code tables.

use serde_json::Value;

/// Separator between a group name and an element's short name.
pub const SEPARATOR: char = '.';
/// Prefix of the global table backing an implicitly materialized view.
pub const MAT_PREFIX: &str = "#MAT_";
/// Prefix of the global table backing a code-table lookup.
pub const CODE_PREFIX: &str = "#CODE_";

/// Canonical registry key: trimmed, quotes stripped, upper-cased.
pub fn canonical_name(ident: &str) -> String {
    let trimmed = ident.trim();
    let unquoted = if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    };
    unquoted.to_uppercase()
}

/// `#MAT_<VIEW>` for a view's full name.
pub fn mat_table_name(view_full_name: &str) -> String {
    format!("{}{}", MAT_PREFIX, view_full_name.to_uppercase())
}

/// Inverse of `mat_table_name`; `None` when the name is not a mat table.
pub fn view_name_of_mat_table(name: &str) -> Option<&str> {
    match name.get(..MAT_PREFIX.len()) {
        Some(head) if name.len() > MAT_PREFIX.len() && head.eq_ignore_ascii_case(MAT_PREFIX) => name.get(MAT_PREFIX.len()..),
        _ => None,
    }
}

/// Deterministic cache name for a (table, key column, return column) triple.
pub fn code_table_name(code_table: &str, key_element: &str, return_element: &str) -> String {
    format!(
        "{}{}{}{}{}{}",
        CODE_PREFIX,
        code_table.trim().to_uppercase(),
        SEPARATOR,
        key_element.trim().to_uppercase(),
        SEPARATOR,
        return_element.trim().to_uppercase()
    )
}

/// Short element name: everything after the last separator.
pub fn short_name(element: &str) -> &str {
    match element.rfind(SEPARATOR) {
        Some(pos) => &element[pos + 1..],
        None => element,
    }
}

/// Group qualifier of an element, if any.
pub fn qualifier(element: &str) -> Option<&str> {
    element.rfind(SEPARATOR).map(|pos| &element[..pos])
}

pub fn qualify(group: &str, short: &str) -> String {
    format!("{}{}{}", group, SEPARATOR, short)
}

pub fn ends_with_ignore_case(s: &str, suffix: &str) -> bool {
    s.len() >= suffix.len() && s.get(s.len() - suffix.len()..).map_or(false, |tail| tail.eq_ignore_ascii_case(suffix))
}

/// Render a constant as a SQL literal for generated query text.
pub fn sql_literal(v: &Value) -> String {
    match v {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "TRUE".to_string() } else { "FALSE".to_string() },
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        other => format!("'{}'", other.to_string().replace('\'', "''")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_names_are_upper_and_unquoted() {
        assert_eq!(canonical_name(" #temp "), "#TEMP");
        assert_eq!(canonical_name("\"MixedCase\""), "MIXEDCASE");
    }

    #[test]
    fn mat_names_roundtrip() {
        let m = mat_table_name("pm1.Orders_V");
        assert_eq!(m, "#MAT_PM1.ORDERS_V");
        assert_eq!(view_name_of_mat_table(&m), Some("PM1.ORDERS_V"));
        assert_eq!(view_name_of_mat_table("#TEMP"), None);
        assert_eq!(view_name_of_mat_table("#MAT_"), None);
    }

    #[test]
    fn code_table_names_are_case_normalized() {
        assert_eq!(code_table_name("pm1.codes", "code", "Descr"), "#CODE_PM1.CODES.CODE.DESCR");
        assert_eq!(code_table_name("PM1.CODES", "CODE", "descr"), code_table_name("pm1.codes", "code", "DESCR"));
    }

    #[test]
    fn element_parts() {
        assert_eq!(short_name("#MAT_PM1.V.id"), "id");
        assert_eq!(qualifier("#MAT_PM1.V.id"), Some("#MAT_PM1.V"));
        assert_eq!(qualifier("id"), None);
        assert!(ends_with_ignore_case("SYS.RefreshMatView", ".refreshmatview"));
        assert!(!ends_with_ignore_case("SYS.refreshmatviewrow", ".refreshmatview"));
    }

    #[test]
    fn literals() {
        assert_eq!(sql_literal(&json!(5)), "5");
        assert_eq!(sql_literal(&json!("o'k")), "'o''k'");
        assert_eq!(sql_literal(&Value::Null), "NULL");
    }
}
