//! Temp-table and materialized-view data manager.
//!
//! `TempTableDataManager` sits in front of the engine's regular data manager.
//! Commands that touch session temp tables, global (materialized) tables, or
//! the system refresh procedures are handled here; everything else is
//! forwarded unchanged.

use std::fmt;
use std::sync::Arc;

use crate::command::Command;
use crate::context::CommandContext;
use crate::error::AppResult;
use crate::executor::{SameThreadExecutor, TaskExecutor};
use crate::tuple::TupleSource;

mod code_table;
mod loader;
mod procedures;
mod router;

pub use procedures::{REFRESH_MAT_VIEW, REFRESH_MAT_VIEW_ROW};

/// Registers commands against the engine's data sources.
pub trait ProcessorDataManager: Send + Sync {
    fn register_request(
        &self,
        ctx: &CommandContext,
        command: Command,
        model_name: &str,
        binding_id: Option<&str>,
        node_id: i32,
    ) -> AppResult<Box<dyn TupleSource>>;
}

pub struct TempTableDataManager {
    processor_data_manager: Arc<dyn ProcessorDataManager>,
    executor: Arc<dyn TaskExecutor>,
    system_model: String,
}

impl fmt::Debug for TempTableDataManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TempTableDataManager").field("system_model", &self.system_model).finish_non_exhaustive()
    }
}

impl TempTableDataManager {
    pub fn new(processor_data_manager: Arc<dyn ProcessorDataManager>, system_model: impl Into<String>) -> Self {
        Self { processor_data_manager, executor: Arc::new(SameThreadExecutor), system_model: system_model.into() }
    }

    pub fn with_executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn system_model(&self) -> &str { &self.system_model }
}

impl ProcessorDataManager for TempTableDataManager {
    fn register_request(
        &self,
        ctx: &CommandContext,
        command: Command,
        model_name: &str,
        binding_id: Option<&str>,
        node_id: i32,
    ) -> AppResult<Box<dyn TupleSource>> {
        if let Some(ts) = self.register_temp_request(ctx, model_name, &command)? {
            return Ok(ts);
        }
        self.processor_data_manager.register_request(ctx, command, model_name, binding_id, node_id)
    }
}
