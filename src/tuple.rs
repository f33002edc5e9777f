//! Pull-based row producers.

use std::fmt;

use serde_json::Value;

use crate::error::AppResult;

pub type Row = Vec<Value>;

/// A source of rows pulled one at a time. Dropping a source releases it;
/// `close_source` exists for callers that want to release early and keep the box.
pub trait TupleSource: Send {
    fn next_tuple(&mut self) -> AppResult<Option<Row>>;

    fn close_source(&mut self) {}

    /// Drain the remaining rows.
    fn collect_rows(&mut self) -> AppResult<Vec<Row>> {
        let mut out = Vec::new();
        while let Some(row) = self.next_tuple()? { out.push(row); }
        Ok(out)
    }
}

/// Rows held in memory, served in order.
pub struct CollectionTupleSource {
    rows: std::vec::IntoIter<Row>,
    closed: bool,
}

impl CollectionTupleSource {
    pub fn new(rows: Vec<Row>) -> Self { Self { rows: rows.into_iter(), closed: false } }

    /// Single-row, single-column update count result.
    pub fn update_count(count: i64) -> Self { Self::new(vec![vec![Value::from(count)]]) }
}

impl TupleSource for CollectionTupleSource {
    fn next_tuple(&mut self) -> AppResult<Option<Row>> {
        if self.closed { return Ok(None); }
        Ok(self.rows.next())
    }

    fn close_source(&mut self) { self.closed = true; }
}

impl fmt::Debug for CollectionTupleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionTupleSource").field("remaining", &self.rows.len()).field("closed", &self.closed).finish()
    }
}

/// Scoped acquisition: closes the wrapped source when dropped.
pub struct SourceGuard(pub Box<dyn TupleSource>);

impl SourceGuard {
    pub fn next_tuple(&mut self) -> AppResult<Option<Row>> { self.0.next_tuple() }
}

impl Drop for SourceGuard {
    fn drop(&mut self) { self.0.close_source(); }
}

/// Read the update count out of a single-row result.
pub fn read_update_count(source: &mut dyn TupleSource) -> AppResult<Option<i64>> {
    Ok(source.next_tuple()?.and_then(|row| row.first().and_then(|v| v.as_i64())))
}
