use std::sync::Arc;

use serde_json::json;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use clarium_tempdata::command::{ColumnDef, Command, DataType, Expr, GroupSymbol, Query, StoredProcedure};
use clarium_tempdata::config::TempDataConfig;
use clarium_tempdata::metadata::{CacheHint, InMemoryCatalog, ViewDefinition};
use clarium_tempdata::processor::FnProcessorFactory;
use clarium_tempdata::tuple::{CollectionTupleSource, Row, TupleSource};
use clarium_tempdata::{AppError, AppResult, CommandContext, ProcessorDataManager, SessionManager};

/// Stands in for the engine's source layer: every pass-through command is
/// answered with an empty result.
struct EmptySources;

impl ProcessorDataManager for EmptySources {
    fn register_request(
        &self,
        _ctx: &CommandContext,
        command: Command,
        model_name: &str,
        _binding_id: Option<&str>,
        _node_id: i32,
    ) -> AppResult<Box<dyn TupleSource>> {
        info!(target: "clarium::tempdata", "pass-through model='{}' command={:?}", model_name, command);
        Ok(Box::new(CollectionTupleSource::new(Vec::new())))
    }
}

fn upstream(sql: &str, _name: &str) -> AppResult<Vec<Row>> {
    if sql.contains("pm1.codes") {
        return Ok(vec![vec![json!("US"), json!("United States")], vec![json!("FR"), json!("France")]]);
    }
    if sql.contains("pm1.orders") {
        return Ok((1..=5).map(|i| vec![json!(i), json!(format!("order-{}", i)), json!(i * 10)]).collect());
    }
    Err(AppError::processing("unknown_source".to_string(), format!("No upstream data for: {}", sql)))
}

fn catalog() -> InMemoryCatalog {
    let c = InMemoryCatalog::new();
    c.add_table("pm1.codes", vec![ColumnDef::new("code", DataType::String), ColumnDef::new("country", DataType::String)]);
    c.add_view(
        ViewDefinition::materialized(
            "vm1.orders",
            vec![ColumnDef::new("id", DataType::Integer), ColumnDef::new("label", DataType::String), ColumnDef::new("amount", DataType::Integer)],
            "SELECT id, label, amount FROM pm1.orders",
        )
        .with_primary_key(&["id"])
        .with_cache_hint(CacheHint::new(true, None).with_updatable(true)),
    );
    c
}

fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let config_path = std::env::var("CLARIUM_TEMPDATA_CONFIG").unwrap_or_else(|_| "tempdata.json".to_string());
    let config = TempDataConfig::load_or_default(&config_path).apply_env();
    info!(
        target: "clarium::tempdata",
        "tempdata demo starting: config='{}', system_model={}, executor={:?}",
        config_path, config.system_model, config.executor
    );
    let system_model = config.system_model.clone();

    let sessions = SessionManager::new(config);
    let dm = sessions.data_manager(Arc::new(EmptySources));
    let session = sessions.open_session();
    let ctx = sessions.context(&session, Arc::new(catalog()), Arc::new(FnProcessorFactory::new(upstream)));

    let mat = GroupSymbol::global("#MAT_VM1.ORDERS");
    let query = Command::Query(Query::select(mat.aliased("o"), vec![Expr::col("o.id"), Expr::col("o.amount")]).with_order_by(Expr::col("o.amount"), false));
    let rows = dm.register_request(&ctx, query, "vm1", None, 0)?.collect_rows()?;
    println!("{}", serde_json::to_string_pretty(&rows)?);

    let refresh = Command::StoredProcedure(StoredProcedure { name: format!("{}.refreshMatView", system_model), params: vec![json!("vm1.orders"), json!(true)] });
    let count = dm.register_request(&ctx, refresh, &system_model, None, 0)?.collect_rows()?;
    println!("refreshMatView -> {}", serde_json::to_string(&count)?);

    let country = dm.lookup_code_value(&ctx, "pm1.codes", "country", "code", json!("FR"))?;
    println!("lookup(FR) -> {}", serde_json::to_string(&country)?);

    sessions.close_session(&session);
    Ok(())
}
