//! Expression evaluation over JSON-valued rows.
//!
//! Comparisons follow SQL three-valued logic; a predicate that evaluates to
//! unknown filters the row out. Sorting uses a total order with NULL first.

use std::cmp::Ordering;

use serde_json::{Number, Value};

use crate::command::{ArithOp, ColumnDef, CompOp, Criteria, Expr};
use crate::error::{AppError, AppResult};
use crate::ident;
use crate::tuple::Row;

/// Resolves element names against one table's column list.
#[derive(Debug, Clone, Copy)]
pub struct ColumnResolver<'a> {
    pub table: &'a str,
    pub columns: &'a [ColumnDef],
}

impl<'a> ColumnResolver<'a> {
    pub fn new(table: &'a str, columns: &'a [ColumnDef]) -> Self { Self { table, columns } }

    /// Position of `element` (`short` or `TABLE.short`). The qualifier, when
    /// present, must name this table.
    pub fn position(&self, element: &str) -> AppResult<usize> {
        if let Some(q) = ident::qualifier(element) {
            if !q.eq_ignore_ascii_case(self.table) {
                return Err(AppError::user(
                    "unknown_element".to_string(),
                    format!("Element {} does not belong to group {}", element, self.table),
                ));
            }
        }
        let short = ident::short_name(element);
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(short))
            .ok_or_else(|| AppError::user("unknown_element".to_string(), format!("Unknown element {} in group {}", element, self.table)))
    }
}

/// Row context for evaluation.
#[derive(Debug, Clone, Copy)]
pub struct EvalScope<'a> {
    pub resolver: ColumnResolver<'a>,
    pub row: &'a Row,
}

pub fn evaluate(expr: &Expr, scope: Option<&EvalScope>) -> AppResult<Value> {
    match expr {
        Expr::Constant(v) => Ok(v.clone()),
        Expr::Column(name) => {
            let scope = scope.ok_or_else(|| AppError::user("no_row_context".to_string(), format!("Element {} cannot be evaluated without a row", name)))?;
            let pos = scope.resolver.position(name)?;
            Ok(scope.row.get(pos).cloned().unwrap_or(Value::Null))
        }
        Expr::Arith { left, op, right } => {
            let l = evaluate(left, scope)?;
            let r = evaluate(right, scope)?;
            arith(&l, *op, &r)
        }
        Expr::Call { name, args } => call(name, args, scope),
        Expr::AllColumns => Err(AppError::user("invalid_expression", "* is only valid in a projection")),
    }
}

pub fn evaluate_criteria(criteria: &Criteria, scope: Option<&EvalScope>) -> AppResult<bool> {
    Ok(eval_3vl(criteria, scope)?.unwrap_or(false))
}

fn eval_3vl(criteria: &Criteria, scope: Option<&EvalScope>) -> AppResult<Option<bool>> {
    match criteria {
        Criteria::Compare { left, op, right } => {
            let l = evaluate(left, scope)?;
            let r = evaluate(right, scope)?;
            Ok(compare(&l, &r).map(|ord| match op {
                CompOp::Eq => ord == Ordering::Equal,
                CompOp::Ne => ord != Ordering::Equal,
                CompOp::Lt => ord == Ordering::Less,
                CompOp::Le => ord != Ordering::Greater,
                CompOp::Gt => ord == Ordering::Greater,
                CompOp::Ge => ord != Ordering::Less,
            }))
        }
        Criteria::And(a, b) => {
            let a = eval_3vl(a, scope)?;
            if a == Some(false) { return Ok(Some(false)); }
            let b = eval_3vl(b, scope)?;
            Ok(match (a, b) {
                (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            })
        }
        Criteria::Or(a, b) => {
            let a = eval_3vl(a, scope)?;
            if a == Some(true) { return Ok(Some(true)); }
            let b = eval_3vl(b, scope)?;
            Ok(match (a, b) {
                (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            })
        }
        Criteria::Not(c) => Ok(eval_3vl(c, scope)?.map(|b| !b)),
        Criteria::IsNull { expr, negated } => {
            let v = evaluate(expr, scope)?;
            Ok(Some(v.is_null() != *negated))
        }
        Criteria::In { expr, list, negated } => {
            let v = evaluate(expr, scope)?;
            if v.is_null() { return Ok(None); }
            let mut saw_null = false;
            for e in list {
                let candidate = evaluate(e, scope)?;
                match compare(&v, &candidate) {
                    Some(Ordering::Equal) => return Ok(Some(!*negated)),
                    None => saw_null = true,
                    _ => {}
                }
            }
            if saw_null { Ok(None) } else { Ok(Some(*negated)) }
        }
    }
}

/// SQL comparison: `None` when either side is NULL or the types are incomparable.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn compare_numbers(x: &Number, y: &Number) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) { return Some(a.cmp(&b)); }
    x.as_f64()?.partial_cmp(&y.as_f64()?)
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order used by ORDER BY: NULL first, then by type, then by value.
pub fn sort_cmp(a: &Value, b: &Value) -> Ordering {
    match compare(a, b) {
        Some(ord) => ord,
        None => type_rank(a).cmp(&type_rank(b)).then_with(|| a.to_string().cmp(&b.to_string())),
    }
}

/// Key equality used by primary-key lookups (`1` and `1.0` are the same key).
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        _ => compare(a, b) == Some(Ordering::Equal),
    }
}

fn arith(l: &Value, op: ArithOp, r: &Value) -> AppResult<Value> {
    if l.is_null() || r.is_null() { return Ok(Value::Null); }
    let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) else {
        return Err(AppError::user("invalid_arithmetic".to_string(), format!("Cannot apply {:?} to {} and {}", op, l, r)));
    };
    if let (Some(x), Some(y)) = (l.as_i64(), r.as_i64()) {
        let out = match op {
            ArithOp::Add => x.checked_add(y),
            ArithOp::Sub => x.checked_sub(y),
            ArithOp::Mul => x.checked_mul(y),
            ArithOp::Div => {
                if y == 0 { return Err(AppError::user("divide_by_zero", "Division by zero")); }
                x.checked_div(y)
            }
        };
        if let Some(v) = out { return Ok(Value::from(v)); }
    }
    let out = match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => {
            if b == 0.0 { return Err(AppError::user("divide_by_zero", "Division by zero")); }
            a / b
        }
    };
    Number::from_f64(out)
        .map(Value::Number)
        .ok_or_else(|| AppError::user("invalid_arithmetic".to_string(), format!("Non-finite result for {:?}", op)))
}

fn call(name: &str, args: &[Expr], scope: Option<&EvalScope>) -> AppResult<Value> {
    let upper = name.to_ascii_uppercase();
    match upper.as_str() {
        "UPPER" | "LOWER" => {
            let arg = args.first().ok_or_else(|| AppError::user("wrong_arity".to_string(), format!("{} expects one argument", upper)))?;
            Ok(match evaluate(arg, scope)? {
                Value::String(s) => Value::String(if upper == "UPPER" { s.to_uppercase() } else { s.to_lowercase() }),
                Value::Null => Value::Null,
                other => other,
            })
        }
        "COALESCE" => {
            for a in args {
                let v = evaluate(a, scope)?;
                if !v.is_null() { return Ok(v); }
            }
            Ok(Value::Null)
        }
        _ => Err(AppError::user("unknown_function".to_string(), format!("Unknown function {}", name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::DataType;
    use serde_json::json;

    fn cols() -> Vec<ColumnDef> {
        vec![ColumnDef::new("id", DataType::Integer), ColumnDef::new("name", DataType::String)]
    }

    #[test]
    fn resolves_short_and_qualified_names() {
        let c = cols();
        let r = ColumnResolver::new("#T", &c);
        assert_eq!(r.position("NAME").unwrap(), 1);
        assert_eq!(r.position("#t.id").unwrap(), 0);
        assert!(r.position("x.id").is_err());
        assert!(r.position("missing").is_err());
    }

    #[test]
    fn three_valued_logic_filters_unknown() {
        let c = cols();
        let row = vec![json!(1), Value::Null];
        let scope = EvalScope { resolver: ColumnResolver::new("#T", &c), row: &row };
        assert!(!evaluate_criteria(&Criteria::eq("name", "a"), Some(&scope)).unwrap());
        assert!(!evaluate_criteria(&Criteria::Not(Box::new(Criteria::eq("name", "a"))), Some(&scope)).unwrap());
        assert!(evaluate_criteria(&Criteria::eq("name", "a").or(Criteria::eq("id", 1)), Some(&scope)).unwrap());
        assert!(evaluate_criteria(&Criteria::IsNull { expr: Expr::col("name"), negated: false }, Some(&scope)).unwrap());
    }

    #[test]
    fn numbers_compare_across_int_and_float() {
        assert_eq!(compare(&json!(1), &json!(1.0)), Some(Ordering::Equal));
        assert!(values_equal(&json!(2), &json!(2.0)));
        assert_eq!(sort_cmp(&Value::Null, &json!(0)), Ordering::Less);
    }

    #[test]
    fn arithmetic_and_functions() {
        let e = Expr::Arith { left: Box::new(Expr::val(7)), op: ArithOp::Div, right: Box::new(Expr::val(2)) };
        assert_eq!(evaluate(&e, None).unwrap(), json!(3));
        let e = Expr::Arith { left: Box::new(Expr::val(1.5)), op: ArithOp::Add, right: Box::new(Expr::val(1)) };
        assert_eq!(evaluate(&e, None).unwrap(), json!(2.5));
        let z = Expr::Arith { left: Box::new(Expr::val(1)), op: ArithOp::Div, right: Box::new(Expr::val(0)) };
        assert!(evaluate(&z, None).is_err());
        let u = Expr::Call { name: "upper".into(), args: vec![Expr::val("ab")] };
        assert_eq!(evaluate(&u, None).unwrap(), json!("AB"));
        let c = Expr::Call { name: "COALESCE".into(), args: vec![Expr::Constant(Value::Null), Expr::val(3)] };
        assert_eq!(evaluate(&c, None).unwrap(), json!(3));
    }
}
