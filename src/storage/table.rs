//! In-memory temp table.
//!
//! Rows live behind `RwLock<Arc<Vec<Row>>>`. Scans clone the `Arc` and work on
//! that snapshot; writers build the next vector and publish it in one store, so
//! a scan never observes a half-applied statement.

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::command::{ColumnDef, Create, Criteria, Expr, OrderByItem};
use crate::error::{AppError, AppResult};
use crate::eval::{self, ColumnResolver, EvalScope};
use crate::metadata::CacheHint;
use crate::tuple::{CollectionTupleSource, Row};

/// Per-table settings fixed at creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSettings {
    pub updatable: bool,
    pub prefer_memory: bool,
    pub cache_hint: Option<CacheHint>,
}

impl Default for TableSettings {
    fn default() -> Self { Self { updatable: true, prefer_memory: true, cache_hint: None } }
}

pub struct TempTable {
    name: String,
    columns: Vec<ColumnDef>,
    /// Column positions of the primary key; empty when keyless.
    primary_key: Vec<usize>,
    settings: TableSettings,
    rows: RwLock<Arc<Vec<Row>>>,
}

impl std::fmt::Debug for TempTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TempTable")
            .field("name", &self.name)
            .field("columns", &self.columns)
            .field("primary_key", &self.primary_key)
            .field("settings", &self.settings)
            .field("rows", &self.row_count())
            .finish()
    }
}

impl TempTable {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>, primary_key: Vec<usize>, settings: TableSettings) -> Self {
        Self { name: name.into(), columns, primary_key, settings, rows: RwLock::new(Arc::new(Vec::new())) }
    }

    /// Build from a CREATE definition, resolving key names to positions.
    pub fn from_create(name: impl Into<String>, create: &Create, settings: TableSettings) -> AppResult<Self> {
        let name = name.into();
        let mut pk = Vec::with_capacity(create.primary_key.len());
        for k in &create.primary_key {
            let pos = ColumnResolver::new(&name, &create.columns).position(k)?;
            pk.push(pos);
        }
        Ok(Self::new(name, create.columns.clone(), pk, settings))
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn columns(&self) -> &[ColumnDef] { &self.columns }
    pub fn primary_key(&self) -> &[usize] { &self.primary_key }
    pub fn settings(&self) -> &TableSettings { &self.settings }
    pub fn is_updatable(&self) -> bool { self.settings.updatable }
    pub fn prefers_memory(&self) -> bool { self.settings.prefer_memory }
    pub fn cache_hint(&self) -> Option<&CacheHint> { self.settings.cache_hint.as_ref() }
    pub fn row_count(&self) -> usize { self.rows.read().len() }

    /// Current rows; later writes do not affect the returned snapshot.
    pub fn snapshot(&self) -> Arc<Vec<Row>> { self.rows.read().clone() }

    fn resolver(&self) -> ColumnResolver<'_> { ColumnResolver::new(&self.name, &self.columns) }

    fn key_of<'r>(&self, row: &'r Row) -> Vec<&'r Value> {
        self.primary_key.iter().map(|&i| &row[i]).collect()
    }

    fn same_key(&self, a: &Row, b: &Row) -> bool {
        !self.primary_key.is_empty()
            && self.primary_key.iter().all(|&i| match (a.get(i), b.get(i)) {
                (Some(x), Some(y)) => eval::values_equal(x, y),
                _ => false,
            })
    }

    fn check_unique(&self, rows: &[Row], candidate: &Row, skip: Option<usize>) -> AppResult<()> {
        if self.primary_key.is_empty() { return Ok(()); }
        for (i, existing) in rows.iter().enumerate() {
            if Some(i) == skip { continue; }
            if self.same_key(existing, candidate) {
                return Err(AppError::conflict(
                    "duplicate_key".to_string(),
                    format!("Duplicate primary key {:?} in temporary table {}", self.key_of(candidate), self.name),
                ));
            }
        }
        Ok(())
    }

    /// Shape incoming values to the table's column order; unnamed columns become NULL.
    fn shape_row(&self, positions: &[usize], values: Row) -> AppResult<Row> {
        if values.len() != positions.len() {
            return Err(AppError::user(
                "column_count_mismatch".to_string(),
                format!("Expected {} values for {}, got {}", positions.len(), self.name, values.len()),
            ));
        }
        let mut row = vec![Value::Null; self.columns.len()];
        for (pos, v) in positions.iter().zip(values) { row[*pos] = v; }
        Ok(row)
    }

    /// Insert rows for the named columns (all columns when `columns` is empty).
    /// The batch is all-or-nothing.
    pub fn insert(&self, columns: &[String], rows: Vec<Row>) -> AppResult<usize> {
        let positions: Vec<usize> = if columns.is_empty() {
            (0..self.columns.len()).collect()
        } else {
            let r = self.resolver();
            columns.iter().map(|c| r.position(c)).collect::<AppResult<_>>()?
        };
        let mut guard = self.rows.write();
        let mut next: Vec<Row> = (**guard).clone();
        let count = rows.len();
        for values in rows {
            let row = self.shape_row(&positions, values)?;
            self.check_unique(&next, &row, None)?;
            next.push(row);
        }
        *guard = Arc::new(next);
        debug!(target: "clarium::tempdata", "insert table='{}' rows={}", self.name, count);
        Ok(count)
    }

    /// Apply `changes` to every row matching `criteria`.
    pub fn update(&self, criteria: Option<&Criteria>, changes: &[(String, Expr)]) -> AppResult<usize> {
        let resolver = self.resolver();
        let targets: Vec<usize> = changes.iter().map(|(c, _)| resolver.position(c)).collect::<AppResult<_>>()?;
        let mut guard = self.rows.write();
        let mut next: Vec<Row> = (**guard).clone();
        let mut updated = 0usize;
        for i in 0..next.len() {
            let new_row = {
                let scope = EvalScope { resolver, row: &next[i] };
                if let Some(c) = criteria {
                    if !eval::evaluate_criteria(c, Some(&scope))? { continue; }
                }
                let mut row = next[i].clone();
                for ((_, expr), &pos) in changes.iter().zip(&targets) {
                    row[pos] = eval::evaluate(expr, Some(&scope))?;
                }
                row
            };
            if targets.iter().any(|t| self.primary_key.contains(t)) {
                self.check_unique(&next, &new_row, Some(i))?;
            }
            next[i] = new_row;
            updated += 1;
        }
        *guard = Arc::new(next);
        Ok(updated)
    }

    /// Delete rows matching `criteria`; all rows when `None`.
    pub fn delete(&self, criteria: Option<&Criteria>) -> AppResult<usize> {
        let Some(criteria) = criteria else { return Ok(self.truncate()); };
        let resolver = self.resolver();
        let mut guard = self.rows.write();
        let mut kept: Vec<Row> = Vec::with_capacity(guard.len());
        let mut removed = 0usize;
        for row in guard.iter() {
            let scope = EvalScope { resolver, row };
            if eval::evaluate_criteria(criteria, Some(&scope))? {
                removed += 1;
            } else {
                kept.push(row.clone());
            }
        }
        *guard = Arc::new(kept);
        Ok(removed)
    }

    /// Remove every row, returning the prior row count.
    pub fn truncate(&self) -> usize {
        let mut guard = self.rows.write();
        let n = guard.len();
        *guard = Arc::new(Vec::new());
        n
    }

    /// Keyed upsert (`delete == false`, `tuple` is a full row) or keyed delete
    /// (`delete == true`, `tuple` starts with the key values). Returns the
    /// affected row, or `None` when nothing changed.
    ///
    /// An upsert always rewrites the row, so `Some` does not mean the stored
    /// values differed.
    pub fn update_tuple(&self, tuple: Row, delete: bool) -> AppResult<Option<Row>> {
        if self.primary_key.is_empty() {
            return Err(AppError::user("no_primary_key".to_string(), format!("Temporary table {} has no primary key", self.name)));
        }
        if !delete && tuple.len() != self.columns.len() {
            return Err(AppError::user(
                "column_count_mismatch".to_string(),
                format!("Expected {} values for {}, got {}", self.columns.len(), self.name, tuple.len()),
            ));
        }
        let mut guard = self.rows.write();
        let existing = {
            let matches_key = |row: &Row| -> bool {
                if delete {
                    self.primary_key.iter().enumerate().all(|(k, &pos)| tuple.get(k).map(|v| eval::values_equal(&row[pos], v)).unwrap_or(false))
                } else {
                    self.same_key(row, &tuple)
                }
            };
            guard.iter().position(matches_key)
        };
        let rows = Arc::make_mut(&mut *guard);
        match (existing, delete) {
            (Some(i), true) => Ok(Some(rows.remove(i))),
            (None, true) => Ok(None),
            (Some(i), false) => {
                rows[i] = tuple.clone();
                Ok(Some(tuple))
            }
            (None, false) => {
                rows.push(tuple.clone());
                Ok(Some(tuple))
            }
        }
    }

    /// Scan: filter, order, then project over a snapshot of the rows.
    pub fn create_tuple_source(&self, projection: &[Expr], criteria: Option<&Criteria>, order_by: &[OrderByItem]) -> AppResult<CollectionTupleSource> {
        let snapshot = self.snapshot();
        let resolver = self.resolver();
        let mut selected: Vec<(Vec<Value>, &Row)> = Vec::new();
        for row in snapshot.iter() {
            let scope = EvalScope { resolver, row };
            if let Some(c) = criteria {
                if !eval::evaluate_criteria(c, Some(&scope))? { continue; }
            }
            let mut keys = Vec::with_capacity(order_by.len());
            for o in order_by { keys.push(eval::evaluate(&o.expr, Some(&scope))?); }
            selected.push((keys, row));
        }
        if !order_by.is_empty() {
            selected.sort_by(|(ka, _), (kb, _)| {
                for (i, o) in order_by.iter().enumerate() {
                    let ord = eval::sort_cmp(&ka[i], &kb[i]);
                    let ord = if o.asc { ord } else { ord.reverse() };
                    if ord != std::cmp::Ordering::Equal { return ord; }
                }
                std::cmp::Ordering::Equal
            });
        }
        let mut out = Vec::with_capacity(selected.len());
        for (_, row) in selected {
            let scope = EvalScope { resolver, row };
            let mut projected = Vec::with_capacity(projection.len());
            for e in projection {
                match e {
                    Expr::AllColumns => projected.extend(row.iter().cloned()),
                    other => projected.push(eval::evaluate(other, Some(&scope))?),
                }
            }
            out.push(projected);
        }
        Ok(CollectionTupleSource::new(out))
    }
}
