//! Command model consumed by the data manager.
//!
//! Commands arrive already parsed and resolved; this module only describes
//! their shape. Scalar expressions (`Expr`) and predicates (`Criteria`) are
//! kept apart the same way the parser keeps arithmetic and WHERE trees apart.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tuple::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompOp { Eq, Ne, Lt, Le, Gt, Ge }

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp { Add, Sub, Mul, Div }

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Element reference, either short (`a`) or qualified (`#T.a`).
    Column(String),
    Constant(Value),
    Arith { left: Box<Expr>, op: ArithOp, right: Box<Expr> },
    /// Scalar function call: UPPER, LOWER, COALESCE
    Call { name: String, args: Vec<Expr> },
    /// `*` in a projection
    AllColumns,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Criteria {
    Compare { left: Expr, op: CompOp, right: Expr },
    And(Box<Criteria>, Box<Criteria>),
    Or(Box<Criteria>, Box<Criteria>),
    Not(Box<Criteria>),
    IsNull { expr: Expr, negated: bool },
    In { expr: Expr, list: Vec<Expr>, negated: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    pub expr: Expr,
    pub asc: bool,
}

impl Expr {
    pub fn col(name: impl Into<String>) -> Self { Expr::Column(name.into()) }
    pub fn val(v: impl Into<Value>) -> Self { Expr::Constant(v.into()) }

    /// Rewrite every column leaf in one pass.
    pub fn map_columns<F: FnMut(String) -> String>(self, f: &mut F) -> Expr {
        match self {
            Expr::Column(name) => Expr::Column(f(name)),
            Expr::Arith { left, op, right } => {
                let left = left.map_columns(f);
                let right = right.map_columns(f);
                Expr::Arith { left: Box::new(left), op, right: Box::new(right) }
            }
            Expr::Call { name, args } => {
                let mut mapped = Vec::with_capacity(args.len());
                for a in args { mapped.push(a.map_columns(f)); }
                Expr::Call { name, args: mapped }
            }
            other => other,
        }
    }
}

impl Criteria {
    pub fn compare(left: Expr, op: CompOp, right: Expr) -> Self { Criteria::Compare { left, op, right } }

    /// `column = value`
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Criteria::Compare { left: Expr::Column(column.into()), op: CompOp::Eq, right: Expr::Constant(value.into()) }
    }

    pub fn and(self, other: Criteria) -> Self { Criteria::And(Box::new(self), Box::new(other)) }
    pub fn or(self, other: Criteria) -> Self { Criteria::Or(Box::new(self), Box::new(other)) }

    pub fn map_columns<F: FnMut(String) -> String>(self, f: &mut F) -> Criteria {
        match self {
            Criteria::Compare { left, op, right } => {
                let left = left.map_columns(f);
                let right = right.map_columns(f);
                Criteria::Compare { left, op, right }
            }
            Criteria::And(a, b) => {
                let a = a.map_columns(f);
                let b = b.map_columns(f);
                Criteria::And(Box::new(a), Box::new(b))
            }
            Criteria::Or(a, b) => {
                let a = a.map_columns(f);
                let b = b.map_columns(f);
                Criteria::Or(Box::new(a), Box::new(b))
            }
            Criteria::Not(c) => Criteria::Not(Box::new(c.map_columns(f))),
            Criteria::IsNull { expr, negated } => Criteria::IsNull { expr: expr.map_columns(f), negated },
            Criteria::In { expr, list, negated } => {
                let expr = expr.map_columns(f);
                let mut mapped = Vec::with_capacity(list.len());
                for e in list { mapped.push(e.map_columns(f)); }
                Criteria::In { expr, list: mapped, negated }
            }
        }
    }
}

/// A FROM/target group reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSymbol {
    /// Name as written in the statement (the correlation name when aliased).
    pub name: String,
    /// Canonical stored name when `name` is an alias.
    pub definition: Option<String>,
    pub is_temp: bool,
    pub is_global: bool,
}

impl GroupSymbol {
    /// Plain (non-temp) group; always passed through.
    pub fn physical(name: impl Into<String>) -> Self {
        Self { name: name.into(), definition: None, is_temp: false, is_global: false }
    }

    /// Session-scoped temp group.
    pub fn temp(name: impl Into<String>) -> Self {
        Self { name: name.into(), definition: None, is_temp: true, is_global: false }
    }

    /// Process-wide temp group (materialized view or code table).
    pub fn global(name: impl Into<String>) -> Self {
        Self { name: name.into(), definition: None, is_temp: true, is_global: true }
    }

    /// Reference the same group under a correlation name.
    pub fn aliased(mut self, alias: impl Into<String>) -> Self {
        let def = self.definition.take().unwrap_or_else(|| self.name.clone());
        self.definition = Some(def);
        self.name = alias.into();
        self
    }

    pub fn non_correlation_name(&self) -> &str {
        self.definition.as_deref().unwrap_or(self.name.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType { String, Integer, Long, Double, Boolean, Object }

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self { Self { name: name.into(), data_type } }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub from: Vec<GroupSymbol>,
    pub select: Vec<Expr>,
    pub criteria: Option<Criteria>,
    pub order_by: Vec<OrderByItem>,
}

impl Query {
    pub fn select_all(group: GroupSymbol) -> Self {
        Self { from: vec![group], select: vec![Expr::AllColumns], criteria: None, order_by: Vec::new() }
    }

    pub fn select(group: GroupSymbol, select: Vec<Expr>) -> Self {
        Self { from: vec![group], select, criteria: None, order_by: Vec::new() }
    }

    pub fn with_criteria(mut self, criteria: Criteria) -> Self { self.criteria = Some(criteria); self }

    pub fn with_order_by(mut self, expr: Expr, asc: bool) -> Self {
        self.order_by.push(OrderByItem { expr, asc });
        self
    }

    /// Rewrite every element reference of the query (projection, criteria, ordering).
    pub fn map_columns<F: FnMut(String) -> String>(self, f: &mut F) -> Query {
        let Query { from, select, criteria, order_by } = self;
        let mut mapped_select = Vec::with_capacity(select.len());
        for e in select { mapped_select.push(e.map_columns(f)); }
        let criteria = criteria.map(|c| c.map_columns(f));
        let mut mapped_order = Vec::with_capacity(order_by.len());
        for o in order_by { mapped_order.push(OrderByItem { expr: o.expr.map_columns(f), asc: o.asc }); }
        Query { from, select: mapped_select, criteria, order_by: mapped_order }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsertSource {
    /// Single row of expressions evaluated without row context.
    Values(Vec<Expr>),
    /// Rows already produced by a subplan.
    Rows(Vec<Row>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub group: GroupSymbol,
    pub columns: Vec<String>,
    pub source: InsertSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub group: GroupSymbol,
    pub changes: Vec<(String, Expr)>,
    pub criteria: Option<Criteria>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub group: GroupSymbol,
    pub criteria: Option<Criteria>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Create {
    pub table: GroupSymbol,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Drop {
    pub table: GroupSymbol,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredProcedure {
    /// Fully-qualified callable name, e.g. `SYS.refreshMatView`.
    pub name: String,
    /// Positional constant parameters.
    pub params: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Query(Query),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
    Create(Create),
    Drop(Drop),
    StoredProcedure(StoredProcedure),
}

impl Command {
    /// Target group of procedure-container commands (insert/update/delete).
    pub fn container_group(&self) -> Option<&GroupSymbol> {
        match self {
            Command::Insert(i) => Some(&i.group),
            Command::Update(u) => Some(&u.group),
            Command::Delete(d) => Some(&d.group),
            _ => None,
        }
    }
}
