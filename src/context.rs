//! Per-command calling context.

use std::fmt;
use std::sync::Arc;

use crate::metadata::MetadataCatalog;
use crate::processor::QueryProcessorFactory;
use crate::storage::TempTableStore;

/// Everything a command needs besides the command itself. Cheap to clone.
#[derive(Clone)]
pub struct CommandContext {
    pub session_id: Option<String>,
    /// Session (or procedure-scoped) store; `None` for contexts with no session.
    pub temp_store: Option<Arc<TempTableStore>>,
    pub global_store: Arc<TempTableStore>,
    pub metadata: Arc<dyn MetadataCatalog>,
    pub processor_factory: Arc<dyn QueryProcessorFactory>,
}

impl fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandContext")
            .field("session_id", &self.session_id)
            .field("temp_store", &self.temp_store)
            .finish_non_exhaustive()
    }
}

impl CommandContext {
    pub fn new(
        global_store: Arc<TempTableStore>,
        metadata: Arc<dyn MetadataCatalog>,
        processor_factory: Arc<dyn QueryProcessorFactory>,
    ) -> Self {
        Self { session_id: None, temp_store: None, global_store, metadata, processor_factory }
    }

    pub fn with_session(mut self, session_id: impl Into<String>, store: Arc<TempTableStore>) -> Self {
        self.session_id = Some(session_id.into());
        self.temp_store = Some(store);
        self
    }

    /// Same context with `store` as the session-scoped store.
    pub fn with_temp_store(&self, store: Arc<TempTableStore>) -> Self {
        let mut c = self.clone();
        c.temp_store = Some(store);
        c
    }
}
