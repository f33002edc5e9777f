//! Query processor contract used to run defining queries.

use std::fmt;
use std::sync::Arc;

use crate::context::CommandContext;
use crate::error::AppResult;
use crate::tuple::{Row, TupleSource};

/// A planned query ready to produce rows.
pub trait QueryProcessor: TupleSource {
    /// In non-blocking mode the processor must not park waiting for more
    /// source data; loaders always run it this way.
    fn set_non_blocking(&mut self, non_blocking: bool);
}

pub trait QueryProcessorFactory: Send + Sync {
    /// Plan `sql`. `name` identifies the group being populated and is used for
    /// diagnostics only.
    fn create_query_processor(&self, sql: &str, name: &str, ctx: &CommandContext) -> AppResult<Box<dyn QueryProcessor>>;
}

type RowsFn = dyn Fn(&str, &str) -> AppResult<Vec<Row>> + Send + Sync;

/// Factory backed by a closure returning the full result of each query.
#[derive(Clone)]
pub struct FnProcessorFactory {
    f: Arc<RowsFn>,
}

impl FnProcessorFactory {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&str, &str) -> AppResult<Vec<Row>> + Send + Sync + 'static,
    {
        Self { f: Arc::new(f) }
    }
}

impl fmt::Debug for FnProcessorFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("FnProcessorFactory") }
}

impl QueryProcessorFactory for FnProcessorFactory {
    fn create_query_processor(&self, sql: &str, name: &str, _ctx: &CommandContext) -> AppResult<Box<dyn QueryProcessor>> {
        let rows = (self.f)(sql, name)?;
        Ok(Box::new(BufferedProcessor::new(rows)))
    }
}

/// Processor over rows that are already materialized.
#[derive(Debug)]
pub struct BufferedProcessor {
    rows: std::vec::IntoIter<Row>,
    non_blocking: bool,
}

impl BufferedProcessor {
    pub fn new(rows: Vec<Row>) -> Self { Self { rows: rows.into_iter(), non_blocking: false } }
    pub fn is_non_blocking(&self) -> bool { self.non_blocking }
}

impl TupleSource for BufferedProcessor {
    fn next_tuple(&mut self) -> AppResult<Option<Row>> { Ok(self.rows.next()) }
}

impl QueryProcessor for BufferedProcessor {
    fn set_non_blocking(&mut self, non_blocking: bool) { self.non_blocking = non_blocking; }
}
