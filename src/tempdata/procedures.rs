//! System refresh procedures for implicitly materialized views.
//!
//! `<system>.refreshMatView(view, invalidate)` reloads a whole view;
//! `<system>.refreshMatViewRow(view, key)` re-reads one row by its
//! single-column primary key. Both return an update count, `-1` meaning the
//! refresh could not run now.

use serde_json::Value;
use tracing::info;

use super::{loader, TempTableDataManager};
use crate::command::StoredProcedure;
use crate::context::CommandContext;
use crate::error::{AppError, AppResult};
use crate::ident;
use crate::metadata::GroupId;
use crate::tuple::{CollectionTupleSource, TupleSource};

pub const REFRESH_MAT_VIEW: &str = ".refreshmatview";
pub const REFRESH_MAT_VIEW_ROW: &str = ".refreshmatviewrow";

fn view_name_param(proc: &StoredProcedure) -> AppResult<&str> {
    proc.params.first().and_then(Value::as_str).ok_or_else(|| {
        AppError::user("missing_parameter".to_string(), format!("{} requires a view name", proc.name))
    })
}

impl TempTableDataManager {
    pub(super) fn handle_system_procedure(&self, ctx: &CommandContext, proc: &StoredProcedure) -> AppResult<Option<Box<dyn TupleSource>>> {
        let count = if ident::ends_with_ignore_case(&proc.name, REFRESH_MAT_VIEW) {
            refresh_mat_view(ctx, proc)?
        } else if ident::ends_with_ignore_case(&proc.name, REFRESH_MAT_VIEW_ROW) {
            refresh_mat_view_row(ctx, proc)?
        } else {
            return Ok(None);
        };
        Ok(Some(Box::new(CollectionTupleSource::update_count(count))))
    }
}

/// The view must be declared materialized with no external target.
fn validate_mat_view(ctx: &CommandContext, proc: &StoredProcedure) -> AppResult<GroupId> {
    let name = view_name_param(proc)?;
    let md = ctx.metadata.as_ref();
    let check = || -> AppResult<GroupId> {
        let id = md.group_id(name)?;
        if !md.has_materialization(&id)? || md.materialization(&id)?.is_some() {
            return Err(AppError::processing(
                "not_implicit_matview".to_string(),
                format!("{} is not an implicit materialized view", name),
            ));
        }
        Ok(id)
    };
    check().map_err(|e| match e {
        AppError::Processing { .. } => e,
        other => AppError::processing(other.code_str(), other.message()),
    })
}

fn refresh_mat_view(ctx: &CommandContext, proc: &StoredProcedure) -> AppResult<i64> {
    let id = validate_mat_view(ctx, proc)?;
    let view_name = ctx.metadata.full_name(&id)?;
    let mat_name = ident::mat_table_name(&view_name);
    let invalidate = proc.params.get(1).and_then(Value::as_bool).unwrap_or(false);
    let info = ctx.global_store.get_mat_table_info(&mat_name);
    let Some(permit) = info.request_refresh(invalidate) else {
        info!(target: "clarium::matviews", "refresh of '{}' skipped; load already in progress", view_name);
        return Ok(-1);
    };
    let rows = loader::load_global_table(ctx, &mat_name, permit)?;
    Ok(rows as i64)
}

fn refresh_mat_view_row(ctx: &CommandContext, proc: &StoredProcedure) -> AppResult<i64> {
    let id = validate_mat_view(ctx, proc)?;
    let md = ctx.metadata.as_ref();
    let view_name = md.full_name(&id)?;
    let key_columns = match md.primary_key(&id)? {
        Some(k) if !k.is_empty() => k,
        _ => {
            return Err(AppError::user(
                "row_refresh_pk".to_string(),
                format!("Row refresh of {} requires a primary key", view_name),
            ))
        }
    };
    if key_columns.len() > 1 {
        return Err(AppError::user(
            "row_refresh_composite".to_string(),
            format!("Row refresh of {} is not supported for a composite primary key", view_name),
        ));
    }
    let mat_name = ident::mat_table_name(&view_name);
    let info = ctx.global_store.get_mat_table_info(&mat_name);
    if !info.is_valid() {
        return Ok(-1);
    }
    let not_found = || AppError::not_found("global_table_not_found".to_string(), format!("Materialized table {} is not loaded", mat_name));
    let table = ctx.global_store.get_temp_table(&mat_name, false).ok_or_else(not_found)?;
    if !table.is_updatable() {
        return Err(AppError::user(
            "row_refresh_updatable".to_string(),
            format!("Row refresh of {} requires an updatable materialization", view_name),
        ));
    }
    let key = proc.params.get(1).cloned().ok_or_else(|| {
        AppError::user("missing_parameter".to_string(), format!("{} requires a key value", proc.name))
    })?;
    info!(target: "clarium::matviews", "refreshing row {} of materialized view '{}'", key, view_name);

    let sql = format!(
        "SELECT * FROM {} WHERE {}={} OPTION NOCACHE",
        view_name,
        ident::qualify(&view_name, &key_columns[0]),
        ident::sql_literal(&key)
    );
    let mut qp = ctx.processor_factory.create_query_processor(&sql, &ident::canonical_name(&view_name), ctx)?;
    qp.set_non_blocking(true);
    let tuple = qp.next_tuple();
    qp.close_source();
    // a whole-view reload may have swapped the table meanwhile
    let table = ctx.global_store.get_temp_table(&mat_name, false).ok_or_else(not_found)?;
    let changed = match tuple? {
        Some(row) => table.update_tuple(row, false)?,
        None => table.update_tuple(vec![key], true)?,
    };
    Ok(if changed.is_some() { 1 } else { 0 })
}
