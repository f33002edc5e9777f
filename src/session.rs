use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine;
use parking_lot::RwLock;
use tracing::info;

use crate::config::TempDataConfig;
use crate::context::CommandContext;
use crate::executor::{self, TaskExecutor};
use crate::metadata::MetadataCatalog;
use crate::processor::QueryProcessorFactory;
use crate::storage::TempTableStore;
use crate::tempdata::{ProcessorDataManager, TempTableDataManager};
use crate::tprintln;

fn gen_id(bytes: usize) -> String {
    // random token, base64url without padding
    let mut buf = vec![0u8; bytes.max(8)];
    let _ = getrandom::getrandom(&mut buf);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)
}

/// Owns the global store and every open session's store.
pub struct SessionManager {
    config: TempDataConfig,
    global: Arc<TempTableStore>,
    sessions: RwLock<HashMap<String, Arc<TempTableStore>>>,
    executor: Arc<dyn TaskExecutor>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .field("sessions", &self.sessions.read().len())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn new(config: TempDataConfig) -> Self {
        let executor = executor::from_kind(config.executor);
        Self::with_executor(config, executor)
    }

    pub fn with_executor(config: TempDataConfig, executor: Arc<dyn TaskExecutor>) -> Self {
        let global = Arc::new(TempTableStore::new_global(config.default_prefer_memory));
        Self { config, global, sessions: RwLock::new(HashMap::new()), executor }
    }

    pub fn config(&self) -> &TempDataConfig { &self.config }
    pub fn global_store(&self) -> &Arc<TempTableStore> { &self.global }

    pub fn open_session(&self) -> String {
        let id = gen_id(self.config.session_id_bytes);
        let store = Arc::new(TempTableStore::new_session(id.clone(), self.config.default_prefer_memory));
        self.sessions.write().insert(id.clone(), store);
        info!(target: "clarium::session", "session opened id={}", id);
        id
    }

    /// Remove the session and drop its temp tables. False if unknown.
    pub fn close_session(&self, id: &str) -> bool {
        let removed = self.sessions.write().remove(id);
        match removed {
            Some(store) => {
                let dropped = store.clear();
                info!(target: "clarium::session", "session closed id={} dropped_tables={}", id, dropped);
                true
            }
            None => false,
        }
    }

    pub fn session_store(&self, id: &str) -> Option<Arc<TempTableStore>> {
        self.sessions.read().get(id).cloned()
    }

    pub fn session_count(&self) -> usize { self.sessions.read().len() }

    /// Calling context for `id`; an unknown id yields a context with no session store.
    pub fn context(
        &self,
        id: &str,
        metadata: Arc<dyn MetadataCatalog>,
        processor_factory: Arc<dyn QueryProcessorFactory>,
    ) -> CommandContext {
        let ctx = CommandContext::new(self.global.clone(), metadata, processor_factory);
        match self.session_store(id) {
            Some(store) => ctx.with_session(id, store),
            None => ctx,
        }
    }

    /// Context for a nested procedure scope: new tables stay local, lookups
    /// fall back to the enclosing session.
    pub fn open_child_scope(&self, ctx: &CommandContext, label: &str) -> CommandContext {
        match &ctx.temp_store {
            Some(parent) => {
                tprintln!("session.child_scope sid={:?} label={}", ctx.session_id, label);
                ctx.with_temp_store(Arc::new(TempTableStore::child(parent.clone(), label)))
            }
            None => ctx.with_temp_store(Arc::new(TempTableStore::new_session(label, self.config.default_prefer_memory))),
        }
    }

    /// Data manager wired with this manager's executor and system model.
    pub fn data_manager(&self, pass_through: Arc<dyn ProcessorDataManager>) -> TempTableDataManager {
        TempTableDataManager::new(pass_through, self.config.system_model.clone()).with_executor(self.executor.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::InMemoryCatalog;
    use crate::processor::FnProcessorFactory;

    fn ctx_for(mgr: &SessionManager, id: &str) -> CommandContext {
        mgr.context(id, Arc::new(InMemoryCatalog::new()), Arc::new(FnProcessorFactory::new(|_, _| Ok(vec![]))))
    }

    #[test]
    fn session_ids_are_unique_and_url_safe() {
        let mgr = SessionManager::new(TempDataConfig::default());
        let a = mgr.open_session();
        let b = mgr.open_session();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43); // 32 bytes, unpadded base64
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_eq!(mgr.session_count(), 2);
    }

    #[test]
    fn close_drops_session_tables() {
        let mgr = SessionManager::new(TempDataConfig::default());
        let id = mgr.open_session();
        let ctx = ctx_for(&mgr, &id);
        let store = ctx.temp_store.clone().unwrap();
        let create = crate::command::Create {
            table: crate::command::GroupSymbol::temp("#t"),
            columns: vec![crate::command::ColumnDef::new("a", crate::command::DataType::Integer)],
            primary_key: vec![],
        };
        store.add_temp_table("#t", &create).unwrap();
        assert!(mgr.close_session(&id));
        assert!(!mgr.close_session(&id));
        assert!(store.table_names().is_empty());
        assert!(ctx_for(&mgr, &id).temp_store.is_none());
    }

    #[test]
    fn child_scope_chains_to_session() {
        let mgr = SessionManager::new(TempDataConfig::default());
        let id = mgr.open_session();
        let ctx = ctx_for(&mgr, &id);
        let child = mgr.open_child_scope(&ctx, "proc1");
        let child_store = child.temp_store.clone().unwrap();
        assert!(Arc::ptr_eq(child_store.parent().unwrap(), ctx.temp_store.as_ref().unwrap()));
        assert!(Arc::ptr_eq(&child.global_store, mgr.global_store()));
    }
}
