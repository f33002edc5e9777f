//! Metadata catalog contract and an in-memory implementation.
//!
//! The real engine resolves groups through its metadata layer; the data
//! manager only needs the handful of lookups below.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::command::{ColumnDef, DataType};
use crate::error::{AppError, AppResult};
use crate::ident;

/// Caching directives declared on a materialized source.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CacheHint {
    #[serde(default)]
    pub prefers_memory: bool,
    #[serde(default)]
    pub ttl_ms: Option<u64>,
    #[serde(default)]
    pub updatable: bool,
}

impl CacheHint {
    pub fn new(prefers_memory: bool, ttl: Option<Duration>) -> Self {
        Self { prefers_memory, ttl_ms: ttl.map(|d| d.as_millis() as u64), updatable: false }
    }

    pub fn with_updatable(mut self, updatable: bool) -> Self { self.updatable = updatable; self }

    pub fn ttl(&self) -> Option<Duration> { self.ttl_ms.map(Duration::from_millis) }
}

/// Resolved group identifier (canonical upper-case full name).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupId(pub String);

pub trait MetadataCatalog: Send + Sync {
    fn group_id(&self, name: &str) -> AppResult<GroupId>;
    fn full_name(&self, id: &GroupId) -> AppResult<String>;
    fn columns(&self, id: &GroupId) -> AppResult<Vec<ColumnDef>>;
    /// Short names of the primary key elements, in key order.
    fn primary_key(&self, id: &GroupId) -> AppResult<Option<Vec<String>>>;
    /// Whether the group is declared materialized.
    fn has_materialization(&self, id: &GroupId) -> AppResult<bool>;
    /// External materialization target, if the view is backed by one.
    fn materialization(&self, id: &GroupId) -> AppResult<Option<String>>;
    /// Defining query text of a view.
    fn virtual_plan(&self, id: &GroupId) -> AppResult<String>;
    fn cache_hint(&self, id: &GroupId) -> AppResult<Option<CacheHint>>;
    /// Type of a fully-qualified element (`group.element`).
    fn element_type(&self, element: &str) -> AppResult<DataType>;

    /// Zero-based position of an element within its group.
    fn element_position(&self, id: &GroupId, element: &str) -> AppResult<usize> {
        let short = ident::short_name(element);
        self.columns(id)?
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(short))
            .ok_or_else(|| AppError::metadata("element_not_found".to_string(), format!("{} is not an element of {}", element, id.0)))
    }
}

#[derive(Debug, Clone)]
struct CatalogGroup {
    full_name: String,
    columns: Vec<ColumnDef>,
    primary_key: Option<Vec<String>>,
    materialized: bool,
    external_materialization: Option<String>,
    defining_query: Option<String>,
    cache_hint: Option<CacheHint>,
}

/// Declaration of a view for `InMemoryCatalog::add_view`.
#[derive(Debug, Clone)]
pub struct ViewDefinition {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Option<Vec<String>>,
    pub defining_query: String,
    pub materialized: bool,
    pub external_materialization: Option<String>,
    pub cache_hint: Option<CacheHint>,
}

impl ViewDefinition {
    /// Implicitly materialized view with no key and no hint.
    pub fn materialized(name: impl Into<String>, columns: Vec<ColumnDef>, defining_query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            primary_key: None,
            defining_query: defining_query.into(),
            materialized: true,
            external_materialization: None,
            cache_hint: None,
        }
    }

    pub fn with_primary_key(mut self, key: &[&str]) -> Self {
        self.primary_key = Some(key.iter().map(|k| k.to_string()).collect());
        self
    }

    pub fn with_cache_hint(mut self, hint: CacheHint) -> Self { self.cache_hint = Some(hint); self }
}

/// Catalog backed by a map; used by tests and the demo binary.
#[derive(Default)]
pub struct InMemoryCatalog {
    groups: RwLock<HashMap<String, CatalogGroup>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self { Self::default() }

    /// Register a physical table.
    pub fn add_table(&self, name: &str, columns: Vec<ColumnDef>) {
        let group = CatalogGroup {
            full_name: name.to_string(),
            columns,
            primary_key: None,
            materialized: false,
            external_materialization: None,
            defining_query: None,
            cache_hint: None,
        };
        self.groups.write().insert(ident::canonical_name(name), group);
    }

    pub fn add_view(&self, view: ViewDefinition) {
        let group = CatalogGroup {
            full_name: view.name.clone(),
            columns: view.columns,
            primary_key: view.primary_key,
            materialized: view.materialized,
            external_materialization: view.external_materialization,
            defining_query: Some(view.defining_query),
            cache_hint: view.cache_hint,
        };
        self.groups.write().insert(ident::canonical_name(&view.name), group);
    }

    fn with_group<T>(&self, id: &GroupId, f: impl FnOnce(&CatalogGroup) -> T) -> AppResult<T> {
        let g = self.groups.read();
        g.get(&id.0)
            .map(f)
            .ok_or_else(|| AppError::metadata("group_not_found".to_string(), format!("Group does not exist: {}", id.0)))
    }
}

impl MetadataCatalog for InMemoryCatalog {
    fn group_id(&self, name: &str) -> AppResult<GroupId> {
        let key = ident::canonical_name(name);
        if self.groups.read().contains_key(&key) {
            Ok(GroupId(key))
        } else {
            Err(AppError::metadata("group_not_found".to_string(), format!("Group does not exist: {}", name)))
        }
    }

    fn full_name(&self, id: &GroupId) -> AppResult<String> { self.with_group(id, |g| g.full_name.clone()) }

    fn columns(&self, id: &GroupId) -> AppResult<Vec<ColumnDef>> { self.with_group(id, |g| g.columns.clone()) }

    fn primary_key(&self, id: &GroupId) -> AppResult<Option<Vec<String>>> { self.with_group(id, |g| g.primary_key.clone()) }

    fn has_materialization(&self, id: &GroupId) -> AppResult<bool> { self.with_group(id, |g| g.materialized) }

    fn materialization(&self, id: &GroupId) -> AppResult<Option<String>> {
        self.with_group(id, |g| g.external_materialization.clone())
    }

    fn virtual_plan(&self, id: &GroupId) -> AppResult<String> {
        self.with_group(id, |g| g.defining_query.clone())?
            .ok_or_else(|| AppError::metadata("no_virtual_plan".to_string(), format!("{} is not a view", id.0)))
    }

    fn cache_hint(&self, id: &GroupId) -> AppResult<Option<CacheHint>> { self.with_group(id, |g| g.cache_hint.clone()) }

    fn element_type(&self, element: &str) -> AppResult<DataType> {
        let group = ident::qualifier(element)
            .ok_or_else(|| AppError::metadata("element_not_found".to_string(), format!("Unqualified element {}", element)))?;
        let id = self.group_id(group)?;
        let pos = self.element_position(&id, element)?;
        self.with_group(&id, |g| g.columns[pos].data_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> InMemoryCatalog {
        let c = InMemoryCatalog::new();
        c.add_table("pm1.codes", vec![ColumnDef::new("code", DataType::Integer), ColumnDef::new("descr", DataType::String)]);
        c.add_view(ViewDefinition::materialized("pm1.v", vec![ColumnDef::new("id", DataType::Integer)], "SELECT id FROM pm1.t").with_primary_key(&["id"]));
        c
    }

    #[test]
    fn resolves_groups_case_insensitively() {
        let c = catalog();
        let id = c.group_id("PM1.V").unwrap();
        assert_eq!(c.full_name(&id).unwrap(), "pm1.v");
        assert!(c.has_materialization(&id).unwrap());
        assert_eq!(c.primary_key(&id).unwrap(), Some(vec!["id".to_string()]));
        assert_eq!(c.virtual_plan(&id).unwrap(), "SELECT id FROM pm1.t");
    }

    #[test]
    fn unknown_group_is_metadata_error() {
        let err = catalog().group_id("pm1.nope").unwrap_err();
        assert!(matches!(err, AppError::Metadata { .. }));
    }

    #[test]
    fn element_type_and_position() {
        let c = catalog();
        assert_eq!(c.element_type("pm1.codes.descr").unwrap(), DataType::String);
        let id = c.group_id("pm1.codes").unwrap();
        assert_eq!(c.element_position(&id, "pm1.codes.DESCR").unwrap(), 1);
        assert!(c.virtual_plan(&id).is_err());
    }

    #[test]
    fn cache_hint_ttl() {
        let h = CacheHint::new(true, Some(Duration::from_secs(2))).with_updatable(true);
        assert_eq!(h.ttl(), Some(Duration::from_millis(2000)));
        assert!(h.updatable);
    }
}
