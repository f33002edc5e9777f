//! Code table lookups: point lookups served from a lazily materialized
//! key/value table, declared once per (table, key, return) triple.

use serde_json::Value;
use tracing::debug;

use super::TempTableDataManager;
use crate::command::{ColumnDef, Command, CompOp, Criteria, Expr, GroupSymbol, Query};
use crate::context::CommandContext;
use crate::error::{AppError, AppResult};
use crate::ident;
use crate::metadata::CacheHint;
use crate::storage::TempGroup;
use crate::tuple::SourceGuard;

impl TempTableDataManager {
    /// Value of `return_element` for the row of `code_table` whose
    /// `key_element` equals `key_value`; `None` when no row matches.
    pub fn lookup_code_value(
        &self,
        ctx: &CommandContext,
        code_table: &str,
        return_element: &str,
        key_element: &str,
        key_value: Value,
    ) -> AppResult<Option<Value>> {
        let mat_name = ident::code_table_name(code_table, key_element, return_element);
        let md = ctx.metadata.as_ref();
        let key_type = md.element_type(&ident::qualify(code_table, key_element))?;
        let return_type = md.element_type(&ident::qualify(code_table, return_element))?;

        if ctx.global_store.get_temp_group(&mat_name).is_none() {
            let group = TempGroup {
                name: mat_name.clone(),
                columns: vec![ColumnDef::new(key_element, key_type), ColumnDef::new(return_element, return_type)],
                primary_key: vec![key_element.to_string()],
                defining_query: Some(format!("SELECT {} ,{} FROM {}", key_element, return_element, code_table)),
                cache_hint: Some(CacheHint::new(true, None)),
            };
            let (_, created) = ctx.global_store.add_temp_group(group);
            if created {
                debug!(target: "clarium::tempdata", "declared code table '{}'", mat_name);
            }
        }

        let query = Query::select(GroupSymbol::global(mat_name.clone()), vec![Expr::col(ident::qualify(&mat_name, return_element))])
            .with_criteria(Criteria::compare(Expr::col(ident::qualify(&mat_name, key_element)), CompOp::Eq, Expr::Constant(key_value)));
        let ts = self
            .register_query(ctx, &Command::Query(query))?
            .ok_or_else(|| AppError::internal("code_table_unrouted".to_string(), format!("Lookup on {} was not routed", mat_name)))?;
        let mut source = SourceGuard(Box::new(ts));
        Ok(source.next_tuple()?.and_then(|row| row.into_iter().next()))
    }
}
