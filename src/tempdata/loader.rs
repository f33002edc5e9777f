//! Populating global tables from their defining queries.

use tracing::{error, info};

use crate::command::{Create, GroupSymbol};
use crate::context::CommandContext;
use crate::error::{AppError, AppResult};
use crate::ident;
use crate::metadata::CacheHint;
use crate::storage::{LoadPermit, TableSettings, TempTable, TempTableStore};

/// How to build one global table.
#[derive(Debug, Clone)]
pub(super) struct MatDefinition {
    pub name: String,
    pub create: Create,
    pub defining_query: String,
    pub cache_hint: Option<CacheHint>,
}

impl MatDefinition {
    /// Loaded tables are read-only unless a keyed view's hint says otherwise.
    fn settings(&self, store: &TempTableStore) -> TableSettings {
        let mut settings = TableSettings { updatable: false, cache_hint: self.cache_hint.clone(), ..store.default_settings() };
        if let Some(hint) = &self.cache_hint {
            settings.prefer_memory = hint.prefers_memory;
            if !self.create.primary_key.is_empty() {
                settings.updatable = hint.updatable;
            }
        }
        settings
    }

    pub fn empty_table(&self, store: &TempTableStore) -> AppResult<TempTable> {
        TempTable::from_create(self.name.clone(), &self.create, self.settings(store))
    }
}

/// Resolve what backs `table_name`: a declared temp group (code tables) first,
/// then the view behind a `#MAT_` name.
pub(super) fn resolve_definition(ctx: &CommandContext, table_name: &str) -> AppResult<MatDefinition> {
    let name = ident::canonical_name(table_name);
    if let Some(group) = ctx.global_store.get_temp_group(&name) {
        let defining_query = group.defining_query.clone().ok_or_else(|| {
            AppError::metadata("no_virtual_plan".to_string(), format!("Temporary group {} has no defining query", name))
        })?;
        return Ok(MatDefinition { name, create: group.to_create(), defining_query, cache_hint: group.cache_hint.clone() });
    }
    let view = ident::view_name_of_mat_table(&name).ok_or_else(|| {
        AppError::not_found("global_table_not_found".to_string(), format!("No definition for global temporary table {}", name))
    })?;
    let md = ctx.metadata.as_ref();
    let id = md.group_id(view)?;
    let create = Create {
        table: GroupSymbol::global(name.clone()),
        columns: md.columns(&id)?,
        primary_key: md.primary_key(&id)?.unwrap_or_default(),
    };
    Ok(MatDefinition { name, create, defining_query: md.virtual_plan(&id)?, cache_hint: md.cache_hint(&id)? })
}

/// Build a fresh table from the defining query. Nothing is published here.
fn build(ctx: &CommandContext, table_name: &str, permit: &LoadPermit) -> AppResult<TempTable> {
    let def = resolve_definition(ctx, table_name)?;
    let table = def.empty_table(&ctx.global_store)?;
    if let Some(ttl) = def.cache_hint.as_ref().and_then(CacheHint::ttl) {
        permit.info().set_ttl(Some(ttl));
    }
    let mut qp = ctx.processor_factory.create_query_processor(&def.defining_query, &def.name, ctx)?;
    qp.set_non_blocking(true);
    let rows = qp.collect_rows();
    qp.close_source();
    table.insert(&[], rows?)?;
    Ok(table)
}

/// Run a load the caller owns. On success the new table replaces the old one
/// under `table_name` and the record becomes LOADED; on failure the old table
/// stays and the record becomes FAILED_LOAD.
pub(super) fn load_global_table(ctx: &CommandContext, table_name: &str, permit: LoadPermit) -> AppResult<usize> {
    info!(target: "clarium::matviews", "loading materialized table '{}'", table_name);
    match build(ctx, table_name, &permit) {
        Ok(table) => {
            let rows = table.row_count();
            ctx.global_store.swap_temp_table(table_name, table);
            permit.complete(rows);
            info!(target: "clarium::matviews", "loaded materialized table '{}' rows={}", table_name, rows);
            Ok(rows)
        }
        Err(e) => {
            error!(target: "clarium::matviews", "failed to load materialized table '{}': {}", table_name, e);
            permit.fail();
            Err(e)
        }
    }
}
