//! Classification and dispatch of commands that target temp tables.

use std::sync::Arc;

use tracing::{debug, error};

use super::{loader, TempTableDataManager};
use crate::command::{Command, GroupSymbol, InsertSource};
use crate::context::CommandContext;
use crate::error::{AppError, AppResult};
use crate::eval;
use crate::ident;
use crate::storage::{TempTable, TempTableStore};
use crate::tuple::{CollectionTupleSource, Row, TupleSource};

fn session_store(ctx: &CommandContext) -> AppResult<&Arc<TempTableStore>> {
    ctx.temp_store
        .as_ref()
        .ok_or_else(|| AppError::user("no_session_scope", "Temporary tables require a session"))
}

fn update_count(n: usize) -> Box<dyn TupleSource> {
    Box::new(CollectionTupleSource::update_count(n as i64))
}

impl TempTableDataManager {
    /// Handle `command` if it belongs here. `Ok(None)` means the caller should
    /// pass it through to the regular data manager.
    pub fn register_temp_request(
        &self,
        ctx: &CommandContext,
        model_name: &str,
        command: &Command,
    ) -> AppResult<Option<Box<dyn TupleSource>>> {
        match command {
            Command::Query(_) => {
                Ok(self.register_query(ctx, command)?.map(|ts| Box::new(ts) as Box<dyn TupleSource>))
            }
            Command::StoredProcedure(proc) => {
                if !model_name.eq_ignore_ascii_case(&self.system_model) { return Ok(None); }
                self.handle_system_procedure(ctx, proc)
            }
            Command::Insert(_) | Command::Update(_) | Command::Delete(_) => {
                let Some(group) = command.container_group() else { return Ok(None) };
                if !group.is_temp { return Ok(None); }
                self.register_mutation(ctx, group, command).map(Some)
            }
            Command::Create(create) => {
                let store = session_store(ctx)?;
                store.add_temp_table(create.table.non_correlation_name(), create)?;
                Ok(Some(update_count(0)))
            }
            Command::Drop(drop) => {
                let store = session_store(ctx)?;
                store.remove_temp_table_by_name(drop.table.non_correlation_name());
                Ok(Some(update_count(0)))
            }
        }
    }

    fn register_mutation(&self, ctx: &CommandContext, group: &GroupSymbol, command: &Command) -> AppResult<Box<dyn TupleSource>> {
        if group.is_global {
            return Err(AppError::user(
                "global_table_not_updatable".to_string(),
                format!("Global temporary table {} can only be changed through a refresh", group.non_correlation_name()),
            ));
        }
        let store = session_store(ctx)?;
        let name = ident::canonical_name(group.non_correlation_name());
        let table = store.get_or_create_temp_table(&name, command, true)?;
        let count = match command {
            Command::Insert(insert) => {
                let rows: Vec<Row> = match &insert.source {
                    InsertSource::Values(exprs) => {
                        let row = exprs.iter().map(|e| eval::evaluate(e, None)).collect::<AppResult<Row>>()?;
                        vec![row]
                    }
                    InsertSource::Rows(rows) => rows.clone(),
                };
                table.insert(&insert.columns, rows)?
            }
            Command::Update(update) => table.update(update.criteria.as_ref(), &update.changes)?,
            Command::Delete(delete) => table.delete(delete.criteria.as_ref())?,
            _ => 0,
        };
        debug!(target: "clarium::tempdata", "temp mutation table='{}' affected={}", name, count);
        Ok(update_count(count))
    }

    /// Scan a temp or global table, loading the latter first when due.
    /// `None` when the query's first group is not a temp group.
    pub(super) fn register_query(&self, ctx: &CommandContext, command: &Command) -> AppResult<Option<CollectionTupleSource>> {
        let Command::Query(query) = command else { return Ok(None) };
        let Some(group) = query.from.first() else { return Ok(None) };
        if !group.is_temp { return Ok(None); }
        let table_name = ident::canonical_name(group.non_correlation_name());
        let table = if group.is_global {
            self.global_table_for_read(ctx, &table_name)?
        } else {
            session_store(ctx)?.get_or_create_temp_table(&table_name, command, true)?
        };
        if !table_name.eq_ignore_ascii_case(&group.name) {
            let remapped = query
                .clone()
                .map_columns(&mut |element: String| ident::qualify(&table_name, ident::short_name(&element)));
            return table.create_tuple_source(&remapped.select, remapped.criteria.as_ref(), &remapped.order_by).map(Some);
        }
        table.create_tuple_source(&query.select, query.criteria.as_ref(), &query.order_by).map(Some)
    }

    fn global_table_for_read(&self, ctx: &CommandContext, table_name: &str) -> AppResult<Arc<TempTable>> {
        let global = &ctx.global_store;
        let info = global.get_mat_table_info(table_name);
        if let Some(permit) = info.should_load() {
            if permit.was_valid() {
                // stale data stays readable while the reload runs
                let task_ctx = ctx.clone();
                let task_name = table_name.to_string();
                self.executor.submit(Box::new(move || {
                    if let Err(e) = loader::load_global_table(&task_ctx, &task_name, permit) {
                        error!(target: "clarium::matviews", "background reload of '{}' failed: {}", task_name, e);
                    }
                }));
            } else {
                loader::load_global_table(ctx, table_name, permit)?;
            }
        }
        match global.get_temp_table(table_name, false) {
            Some(t) => Ok(t),
            None => {
                let def = loader::resolve_definition(ctx, table_name)?;
                Ok(global.install_if_absent(def.empty_table(global)?))
            }
        }
    }
}
