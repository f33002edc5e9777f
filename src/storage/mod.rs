//!
//! clarium-tempdata storage module
//! -------------------------------
//! In-memory registries for temporary tables. A `TempTableStore` is either
//! session-scoped (optionally chained to a parent scope) or global. The global
//! store additionally owns the materialization records and the temp metadata
//! (declared temp groups such as code tables).
//!
//! Names are keyed upper-cased. Tables are held as `Arc<TempTable>` so a swap
//! replaces the handle under a name while in-flight scans keep their snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::command::{ColumnDef, Command, Create, DataType, GroupSymbol};
use crate::error::{AppError, AppResult};
use crate::ident;
use crate::metadata::CacheHint;

pub mod matinfo;
pub mod table;

pub use matinfo::{LoadPermit, MatState, MatStatus, MatTableInfo};
pub use table::{TableSettings, TempTable};

/// Temp metadata entry: a group declared at runtime rather than in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempGroup {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    /// Short names, key order.
    pub primary_key: Vec<String>,
    pub defining_query: Option<String>,
    pub cache_hint: Option<CacheHint>,
}

impl TempGroup {
    pub fn to_create(&self) -> Create {
        Create { table: GroupSymbol::global(self.name.clone()), columns: self.columns.clone(), primary_key: self.primary_key.clone() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreScope {
    Global,
    Session(String),
    /// Procedure-scoped child of a session store.
    Child(String),
}

pub struct TempTableStore {
    scope: StoreScope,
    parent: Option<Arc<TempTableStore>>,
    tables: RwLock<HashMap<String, Arc<TempTable>>>,
    mat_infos: RwLock<HashMap<String, Arc<MatTableInfo>>>,
    temp_groups: RwLock<HashMap<String, Arc<TempGroup>>>,
    prefer_memory_default: bool,
}

impl std::fmt::Debug for TempTableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TempTableStore")
            .field("scope", &self.scope)
            .field("tables", &self.table_names())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

impl TempTableStore {
    fn with_scope(scope: StoreScope, parent: Option<Arc<TempTableStore>>, prefer_memory_default: bool) -> Self {
        Self {
            scope,
            parent,
            tables: RwLock::new(HashMap::new()),
            mat_infos: RwLock::new(HashMap::new()),
            temp_groups: RwLock::new(HashMap::new()),
            prefer_memory_default,
        }
    }

    pub fn new_global(prefer_memory_default: bool) -> Self {
        Self::with_scope(StoreScope::Global, None, prefer_memory_default)
    }

    pub fn new_session(session_id: impl Into<String>, prefer_memory_default: bool) -> Self {
        Self::with_scope(StoreScope::Session(session_id.into()), None, prefer_memory_default)
    }

    /// Child scope whose lookups fall back to `parent` when `delegate` is requested.
    pub fn child(parent: Arc<TempTableStore>, label: impl Into<String>) -> Self {
        let prefer = parent.prefer_memory_default;
        Self::with_scope(StoreScope::Child(label.into()), Some(parent), prefer)
    }

    pub fn scope(&self) -> &StoreScope { &self.scope }
    pub fn parent(&self) -> Option<&Arc<TempTableStore>> { self.parent.as_ref() }

    /// Settings for a table created without a cache hint.
    pub fn default_settings(&self) -> TableSettings {
        TableSettings { updatable: true, prefer_memory: self.prefer_memory_default, cache_hint: None }
    }

    pub fn get_temp_table(&self, name: &str, delegate: bool) -> Option<Arc<TempTable>> {
        let key = ident::canonical_name(name);
        if let Some(t) = self.tables.read().get(&key).cloned() { return Some(t); }
        if delegate {
            if let Some(p) = &self.parent { return p.get_temp_table(name, true); }
        }
        None
    }

    /// Local scope only.
    pub fn has_temp_table(&self, name: &str) -> bool {
        self.tables.read().contains_key(&ident::canonical_name(name))
    }

    /// Look up `name` (through parents when `delegate`), creating it on first
    /// reference. The definition comes from `command`: a CREATE, an INSERT's
    /// column list, or a declared temp group.
    pub fn get_or_create_temp_table(&self, name: &str, command: &Command, delegate: bool) -> AppResult<Arc<TempTable>> {
        if let Some(t) = self.get_temp_table(name, delegate) { return Ok(t); }
        let key = ident::canonical_name(name);
        let table = match command {
            Command::Create(c) => TempTable::from_create(key.clone(), c, self.default_settings())?,
            Command::Insert(i) if !i.columns.is_empty() => {
                let columns = i.columns.iter().map(|c| ColumnDef::new(ident::short_name(c), DataType::Object)).collect();
                TempTable::new(key.clone(), columns, Vec::new(), self.default_settings())
            }
            _ => match self.get_temp_group(name) {
                Some(g) => TempTable::from_create(key.clone(), &g.to_create(), self.default_settings())?,
                None => {
                    return Err(AppError::not_found(
                        "temp_table_not_found".to_string(),
                        format!("Temporary table {} does not exist", name),
                    ))
                }
            },
        };
        Ok(self.install_if_absent(table))
    }

    /// Register `table` unless a table with the same name appeared meanwhile;
    /// returns whichever handle is registered.
    pub fn install_if_absent(&self, table: TempTable) -> Arc<TempTable> {
        let key = ident::canonical_name(table.name());
        let mut w = self.tables.write();
        w.entry(key.clone())
            .or_insert_with(|| {
                debug!(target: "clarium::tempdata", "temp table created scope={:?} name='{}'", self.scope, key);
                Arc::new(table)
            })
            .clone()
    }

    /// Create from a CREATE statement. Conflict when the name exists in this scope.
    pub fn add_temp_table(&self, name: &str, create: &Create) -> AppResult<Arc<TempTable>> {
        let key = ident::canonical_name(name);
        let table = Arc::new(TempTable::from_create(key.clone(), create, self.default_settings())?);
        let mut w = self.tables.write();
        if w.contains_key(&key) {
            return Err(AppError::conflict("table_exist_error".to_string(), format!("Temporary table {} already exists", name)));
        }
        w.insert(key.clone(), table.clone());
        debug!(target: "clarium::tempdata", "temp table added scope={:?} name='{}'", self.scope, key);
        Ok(table)
    }

    pub fn remove_temp_table_by_name(&self, name: &str) -> Option<Arc<TempTable>> {
        let removed = self.tables.write().remove(&ident::canonical_name(name));
        if removed.is_some() {
            debug!(target: "clarium::tempdata", "temp table removed scope={:?} name='{}'", self.scope, name);
        }
        removed
    }

    /// Publish `table` under `name`, returning the handle it replaced.
    pub fn swap_temp_table(&self, name: &str, table: TempTable) -> Option<Arc<TempTable>> {
        self.tables.write().insert(ident::canonical_name(name), Arc::new(table))
    }

    /// Materialization record for `name`, created on first reference.
    pub fn get_mat_table_info(&self, name: &str) -> Arc<MatTableInfo> {
        let key = ident::canonical_name(name);
        // Fast path read
        if let Some(info) = self.mat_infos.read().get(&key).cloned() { return info; }
        let mut w = self.mat_infos.write();
        w.entry(key.clone()).or_insert_with(|| Arc::new(MatTableInfo::new(key))).clone()
    }

    /// Declare a temp group. The first declaration wins; returns the
    /// registered group and whether this call created it.
    pub fn add_temp_group(&self, group: TempGroup) -> (Arc<TempGroup>, bool) {
        let key = ident::canonical_name(&group.name);
        if let Some(g) = self.temp_groups.read().get(&key).cloned() { return (g, false); }
        let mut w = self.temp_groups.write();
        if let Some(g) = w.get(&key).cloned() { return (g, false); }
        let g = Arc::new(group);
        w.insert(key, g.clone());
        (g, true)
    }

    pub fn get_temp_group(&self, name: &str) -> Option<Arc<TempGroup>> {
        self.temp_groups.read().get(&ident::canonical_name(name)).cloned()
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop every table in this scope; returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut w = self.tables.write();
        let n = w.len();
        w.clear();
        n
    }
}
